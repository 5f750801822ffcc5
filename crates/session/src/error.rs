//! Session error types

use crate::config::ConfigError;
use cellucid_bundle::{BundleError, CompressionError};
use cellucid_codec::CodecError;
use thiserror::Error;

/// Errors surfaced by capture and restore
#[derive(Debug, Error)]
pub enum SessionError {
    /// Container, manifest or compression failure
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// A captured chunk record cannot be persisted
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    /// Payload codec failure
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A non-reentrant operation is already running
    #[error("Session busy: {0}")]
    Busy(String),

    /// Two contributors registered under one id
    #[error("Duplicate contributor id: {0}")]
    DuplicateContributor(String),

    /// A contributor failed where failure is fatal
    #[error("Contributor '{contributor_id}' failed: {source}")]
    Contributor {
        /// Registered id of the contributor
        contributor_id: String,
        /// Contributor-owned error
        #[source]
        source: anyhow::Error,
    },

    /// The operation was cancelled
    #[error("Session operation cancelled")]
    Cancelled,

    /// Configuration rejected at build time
    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl SessionError {
    /// Create an invalid chunk error
    pub fn invalid_chunk(msg: impl Into<String>) -> Self {
        Self::InvalidChunk(msg.into())
    }

    /// Wrap a contributor failure
    pub fn contributor(contributor_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Contributor {
            contributor_id: contributor_id.into(),
            source,
        }
    }

    /// True if this error is a cooperative abort rather than a failure
    pub fn is_cancelled(&self) -> bool {
        match self {
            SessionError::Cancelled | SessionError::Codec(CodecError::Cancelled) => true,
            SessionError::Bundle(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

impl From<CompressionError> for SessionError {
    fn from(e: CompressionError) -> Self {
        SessionError::Bundle(BundleError::Compression(e))
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
