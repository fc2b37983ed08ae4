//! # gedfix
//!
//! Command-line front end for the `gedfix-core` engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────────────────┐   ┌──────────┐
//! │  bytes   │──▶│ gedfix-core                              │──▶│ .ged out │
//! │ (decode) │   │ parse → dates → standardize → facts →    │   │ report   │
//! └──────────┘   │ persons → links → facts → validate       │   └──────────┘
//!                └──────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and custom profiles |
//! | [`fix`] | Decoding, running the engine, writing output and reports |

pub mod config;
pub mod fix;
