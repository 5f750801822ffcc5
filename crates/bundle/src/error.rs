//! Session bundle error types

use crate::compression::CompressionError;
use crate::format::LimitsError;
use std::io;
use thiserror::Error;

/// Errors that can occur while writing or reading a session bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// Magic prefix missing or wrong: not a session bundle at all
    #[error("Not a session bundle (bad magic)")]
    NotASessionBundle,

    /// Framing or length violation, including truncation
    #[error("Corrupt bundle: {0}")]
    CorruptBundle(String),

    /// Manifest parsed as JSON but its shape is invalid
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Writer input cannot be framed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Limits exceed the format's hard caps
    #[error("Invalid limits: {0}")]
    InvalidLimits(#[from] LimitsError),

    /// Compression or decompression failed
    #[error(transparent)]
    Compression(#[from] CompressionError),

    /// Reading was cancelled
    #[error("Bundle read cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BundleError {
    /// Create a corrupt bundle error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptBundle(msg.into())
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(msg: impl Into<String>) -> Self {
        Self::InvalidManifest(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True if this error is a cooperative abort rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            BundleError::Cancelled | BundleError::Compression(CompressionError::Cancelled)
        )
    }
}

/// Result type for bundle operations
pub type BundleResult<T> = Result<T, BundleError>;
