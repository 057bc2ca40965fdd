//! Error types for the lightgrep engine

use thiserror::Error;

/// Errors reported by keyword parsing, program construction and program
/// deserialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LightgrepError {
    /// The keyword text could not be parsed
    #[error("invalid keyword {keyword:?}: {reason}")]
    InvalidKeyword {
        /// Keyword as supplied by the caller
        keyword: String,
        /// What went wrong, with the character position where known
        reason: String,
    },

    /// The requested encoding name is not supported
    #[error("unsupported encoding {0:?}")]
    UnknownEncoding(String),

    /// A parser with no keywords cannot produce a program
    #[error("no keywords were added to the parser")]
    NoKeywords,

    /// A serialized program failed validation
    #[error("invalid program: {0}")]
    InvalidProgram(String),

    /// The program would exceed the serialized format limits
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

impl LightgrepError {
    pub(crate) fn keyword(keyword: &str, reason: impl Into<String>) -> Self {
        LightgrepError::InvalidKeyword {
            keyword: keyword.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, LightgrepError>;
