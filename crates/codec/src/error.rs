//! Codec error types

use thiserror::Error;

/// Errors produced by the compact binary codecs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Varint ran past the end of the input or never terminated
    #[error("Malformed varint at offset {offset}")]
    MalformedVarint {
        /// Offset where the varint started
        offset: usize,
    },

    /// A decoded count or index is beyond the caller-supplied limit
    #[error("Bounds exceeded: {what} {value} > {limit}")]
    BoundsExceeded {
        /// What was being checked ("count", "index")
        what: &'static str,
        /// The offending value
        value: u64,
        /// The limit it exceeded
        limit: u64,
    },

    /// A table column declares more bytes than remain in the input
    #[error("Truncated column '{column}': declared {declared} bytes, {available} available")]
    TruncatedColumn {
        /// Column name ("<header>" for the table header itself)
        column: String,
        /// Declared byte length
        declared: usize,
        /// Bytes actually remaining
        available: usize,
    },

    /// Table shape or header is invalid
    #[error("Invalid table: {0}")]
    InvalidTable(String),

    /// Decoding was cancelled
    #[error("Decode cancelled")]
    Cancelled,
}

impl CodecError {
    /// Create a bounds error
    pub fn bounds(what: &'static str, value: u64, limit: u64) -> Self {
        Self::BoundsExceeded { what, value, limit }
    }

    /// Create an invalid table error
    pub fn invalid_table(msg: impl Into<String>) -> Self {
        Self::InvalidTable(msg.into())
    }

    /// Create a truncated column error
    pub fn truncated(column: impl Into<String>, declared: usize, available: usize) -> Self {
        Self::TruncatedColumn {
            column: column.into(),
            declared,
            available,
        }
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
