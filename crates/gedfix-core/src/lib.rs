//! # gedfix core
//!
//! The record-transformation engine behind `gedfix`: a fidelity-preserving
//! GEDCOM tree builder, safe normalizers, fact and person deduplication, a
//! structural validator, and the report they all write into.
//!
//! This crate performs no I/O. Callers hand it decoded text and get back
//! the transformed text plus a [`Report`](report::Report).
//!
//! | Module          | Role                                               |
//! |-----------------|----------------------------------------------------|
//! | [`line`]        | split one line into depth / identifier / tag / value |
//! | [`tree`]        | rebuild the record forest; serialize it back       |
//! | [`dates`]       | classify and safely rewrite `DATE` values          |
//! | [`standardize`] | frequency-based canonical spelling of names, places |
//! | [`facts`]       | drop redundant facts and duplicate links           |
//! | [`persons`]     | score person pairs and merge duplicates            |
//! | [`validate`]    | advisory structural and reference findings         |
//! | [`profile`]     | named, validated rule profiles                     |
//! | [`report`]      | issues, changes and summary counts                 |
//! | [`pipeline`]    | the [`Stage`](pipeline::Stage) trait and [`Engine`](pipeline::Engine) |

pub mod dates;
pub mod error;
pub mod facts;
pub mod line;
pub mod persons;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod standardize;
pub mod tree;
pub mod validate;

pub use error::{EngineError, MergeConsistencyError, ParseError, ParseErrorReason, ProfileError};
pub use pipeline::{Engine, RunOutput, Stage};
pub use profile::{Profile, ProfileOverrides, ProfileTable, StageToggles};
pub use report::{Change, Issue, Report, Severity};
pub use tree::{Document, Record};
