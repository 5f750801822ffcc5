//! Session configuration
//!
//! ## Example
//!
//! ```ignore
//! let config = SessionConfig::new()
//!     .with_max_decompressed_chunk_bytes(64 * 1024 * 1024)
//!     .with_gzip_level(9);
//! config.validate()?;
//! ```

use cellucid_bundle::{BundleLimits, LimitsError, DEFAULT_MAX_DECOMPRESSED_CHUNK_BYTES};

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Default output cap when decompressing one chunk
    ///
    /// A chunk's declared `uncompressedBytes` can lower it per chunk.
    /// Default: 512 MiB (also the maximum)
    pub max_decompressed_chunk_bytes: u64,

    /// Gzip level for chunks captured with the gzip codec (0-9)
    ///
    /// Default: 6
    pub gzip_level: u32,

    /// Yield to the scheduler between lazy chunks
    ///
    /// Default: true
    pub yield_between_lazy_chunks: bool,

    /// Fail the whole restore when a contributor errors in the eager phase
    ///
    /// When false, contributor errors are logged and counted.
    /// Default: false
    pub fail_on_eager_error: bool,

    /// Container size limits
    pub limits: BundleLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_decompressed_chunk_bytes: DEFAULT_MAX_DECOMPRESSED_CHUNK_BYTES,
            gzip_level: 6,
            yield_between_lazy_chunks: true,
            fail_on_eager_error: false,
            limits: BundleLimits::default(),
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default decompression cap (builder pattern)
    pub fn with_max_decompressed_chunk_bytes(mut self, bytes: u64) -> Self {
        self.max_decompressed_chunk_bytes = bytes;
        self
    }

    /// Set the gzip level (builder pattern)
    pub fn with_gzip_level(mut self, level: u32) -> Self {
        self.gzip_level = level;
        self
    }

    /// Set whether lazy restore yields between chunks (builder pattern)
    pub fn with_yield_between_lazy_chunks(mut self, enabled: bool) -> Self {
        self.yield_between_lazy_chunks = enabled;
        self
    }

    /// Set whether eager contributor errors are fatal (builder pattern)
    pub fn with_fail_on_eager_error(mut self, enabled: bool) -> Self {
        self.fail_on_eager_error = enabled;
        self
    }

    /// Set container limits (builder pattern)
    pub fn with_limits(mut self, limits: BundleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_decompressed_chunk_bytes == 0 {
            return Err(ConfigError::ZeroDecompressedCap);
        }
        if self.max_decompressed_chunk_bytes > DEFAULT_MAX_DECOMPRESSED_CHUNK_BYTES {
            return Err(ConfigError::DecompressedCapTooLarge(
                self.max_decompressed_chunk_bytes,
            ));
        }
        if self.gzip_level > 9 {
            return Err(ConfigError::InvalidGzipLevel(self.gzip_level));
        }
        self.limits.validate()?;
        Ok(())
    }

    /// Create a config for testing
    ///
    /// Small limits, no yielding between lazy chunks.
    pub fn for_testing() -> Self {
        SessionConfig {
            max_decompressed_chunk_bytes: 4 * 1024 * 1024,
            gzip_level: 1,
            yield_between_lazy_chunks: false,
            fail_on_eager_error: false,
            limits: BundleLimits::for_testing(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Decompression cap of zero
    #[error("max_decompressed_chunk_bytes must be positive")]
    ZeroDecompressedCap,

    /// Decompression cap above the hard cap
    #[error("max_decompressed_chunk_bytes {0} exceeds the 512 MiB hard cap")]
    DecompressedCapTooLarge(u64),

    /// Gzip level outside 0-9
    #[error("gzip_level {0} is outside 0-9")]
    InvalidGzipLevel(u32),

    /// Container limits invalid
    #[error(transparent)]
    Limits(#[from] LimitsError),
}
