//! Error taxonomy for the engine.
//!
//! Only two conditions are fatal: a malformed line structure
//! ([`ParseError`]) and, in strict mode, a merge whose reference rewrite
//! could not be verified ([`MergeConsistencyError`]). Everything else is
//! advisory and ends up in the [`Report`](crate::report::Report).

/// Why a line could not be tokenized or placed in the tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorReason {
    /// The line has content but does not start with a depth token.
    #[error("missing depth token")]
    MissingDepth,
    /// The depth token is not a non-negative integer.
    #[error("non-numeric depth '{0}'")]
    NonNumericDepth(String),
    /// The line nests deeper than one level below the preceding line.
    #[error("illegal nesting: depth {found} where at most {max_allowed} is allowed")]
    DepthJump { found: usize, max_allowed: usize },
    /// No tag follows the depth (and optional identifier).
    #[error("missing tag")]
    MissingTag,
}

/// Fatal: the input is not a well-formed line hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line_number}: {reason}")]
pub struct ParseError {
    /// 1-based line number in the source text.
    pub line_number: usize,
    pub reason: ParseErrorReason,
}

impl ParseError {
    pub fn new(line_number: usize, reason: ParseErrorReason) -> Self {
        Self {
            line_number,
            reason,
        }
    }
}

/// A merge left references to the merged-away record behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "merge of {secondary} into {primary} left {remaining} reference(s) to {secondary}"
)]
pub struct MergeConsistencyError {
    pub primary: String,
    pub secondary: String,
    pub remaining: usize,
}

/// Invalid profile lookup or override.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
    #[error("review_threshold ({review}) must not exceed auto_merge_threshold ({auto})")]
    InvertedThresholds { review: f64, auto: f64 },
    #[error("{name} must be a finite number >= 0, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("note_prefix must not be empty")]
    EmptyNotePrefix,
}

/// Umbrella error returned by [`Engine::run`](crate::pipeline::Engine::run).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("merge consistency error: {0}")]
    MergeConsistency(#[from] MergeConsistencyError),
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),
}
