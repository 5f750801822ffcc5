//! Container framing shared by the writer and the reader
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Magic: "CELLUCID_SESSION\n" (17 bytes)                          │
//! │ Manifest length: u32 (4 bytes, LE)                              │
//! │ Manifest: UTF-8 JSON (manifest length bytes)                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ For each manifest chunk entry, in order:                        │
//! │   Length: u32 (4 bytes, LE)                                     │
//! │   Data: [u8; length] (stored, possibly compressed)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no chunk index: a chunk's position in the stream is its
//! position in `manifest.chunks`.

/// Magic prefix identifying a session bundle
pub const SESSION_MAGIC: &[u8; MAGIC_LEN] = b"CELLUCID_SESSION\n";

/// Length of [`SESSION_MAGIC`]
pub const MAGIC_LEN: usize = 17;

/// File extension for session bundles
pub const SESSION_EXTENSION: &str = ".cellucid-session";

/// Size of every length field
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Hard cap on manifest bytes (16 MiB)
pub const MAX_MANIFEST_BYTES: u64 = 16 * 1024 * 1024;

/// Hard cap on a single stored chunk, before decompression (512 MiB)
pub const MAX_STORED_CHUNK_BYTES: u64 = 512 * 1024 * 1024;

/// Default cap on a decompressed chunk (512 MiB)
///
/// A chunk's declared `uncompressedBytes` can lower this, never raise it.
pub const DEFAULT_MAX_DECOMPRESSED_CHUNK_BYTES: u64 = 512 * 1024 * 1024;

/// Encode a length field
pub fn encode_len(len: u32) -> [u8; LENGTH_FIELD_SIZE] {
    len.to_le_bytes()
}

/// Decode a length field
pub fn decode_len(bytes: [u8; LENGTH_FIELD_SIZE]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Output cap for decompressing one chunk
///
/// A declared size of zero means "not declared".
pub fn decompressed_cap(declared: u64, default_max: u64) -> u64 {
    if declared == 0 {
        default_max
    } else {
        declared.min(default_max)
    }
}

// =============================================================================
// Limits
// =============================================================================

/// Size limits enforced while writing and reading
///
/// Defaults to the format's hard caps. Limits can be lowered (e.g. for
/// tests or constrained hosts) but never raised above the hard caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleLimits {
    /// Maximum manifest bytes
    pub max_manifest_bytes: u64,
    /// Maximum stored bytes for a single chunk
    pub max_stored_chunk_bytes: u64,
}

impl Default for BundleLimits {
    fn default() -> Self {
        BundleLimits {
            max_manifest_bytes: MAX_MANIFEST_BYTES,
            max_stored_chunk_bytes: MAX_STORED_CHUNK_BYTES,
        }
    }
}

impl BundleLimits {
    /// Limits equal to the hard caps
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the manifest cap (builder pattern)
    pub fn with_max_manifest_bytes(mut self, bytes: u64) -> Self {
        self.max_manifest_bytes = bytes;
        self
    }

    /// Set the stored chunk cap (builder pattern)
    pub fn with_max_stored_chunk_bytes(mut self, bytes: u64) -> Self {
        self.max_stored_chunk_bytes = bytes;
        self
    }

    /// Validate limits against the hard caps
    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.max_manifest_bytes > MAX_MANIFEST_BYTES {
            return Err(LimitsError::ManifestAboveHardCap(self.max_manifest_bytes));
        }
        if self.max_stored_chunk_bytes > MAX_STORED_CHUNK_BYTES {
            return Err(LimitsError::ChunkAboveHardCap(self.max_stored_chunk_bytes));
        }
        if self.max_manifest_bytes == 0 {
            return Err(LimitsError::ZeroManifestLimit);
        }
        Ok(())
    }

    /// Small limits for tests
    pub fn for_testing() -> Self {
        BundleLimits {
            max_manifest_bytes: 64 * 1024,
            max_stored_chunk_bytes: 1024 * 1024,
        }
    }
}

/// Limit validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitsError {
    /// Manifest limit above the 16 MiB hard cap
    #[error("Manifest limit {0} exceeds the 16 MiB hard cap")]
    ManifestAboveHardCap(u64),

    /// Chunk limit above the 512 MiB hard cap
    #[error("Chunk limit {0} exceeds the 512 MiB hard cap")]
    ChunkAboveHardCap(u64),

    /// A manifest can never be empty
    #[error("Manifest limit must be non-zero")]
    ZeroManifestLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_is_17_bytes() {
        assert_eq!(SESSION_MAGIC.len(), 17);
        assert_eq!(&SESSION_MAGIC[..16], b"CELLUCID_SESSION");
        assert_eq!(SESSION_MAGIC[16], b'\n');
    }

    #[test]
    fn test_length_field_little_endian() {
        assert_eq!(encode_len(0x0102_0304), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_len([0x04, 0x03, 0x02, 0x01]), 0x0102_0304);
    }

    #[test]
    fn test_decompressed_cap() {
        let default_max = DEFAULT_MAX_DECOMPRESSED_CHUNK_BYTES;
        assert_eq!(decompressed_cap(0, default_max), default_max);
        assert_eq!(decompressed_cap(1000, default_max), 1000);
        // Never raised by a declared hint
        assert_eq!(decompressed_cap(u64::MAX, default_max), default_max);
    }

    #[test]
    fn test_default_limits_valid() {
        assert!(BundleLimits::default().validate().is_ok());
        assert!(BundleLimits::for_testing().validate().is_ok());
    }

    #[test]
    fn test_limits_cannot_be_raised() {
        let limits = BundleLimits::new().with_max_manifest_bytes(MAX_MANIFEST_BYTES + 1);
        assert!(matches!(
            limits.validate(),
            Err(LimitsError::ManifestAboveHardCap(_))
        ));

        let limits = BundleLimits::new().with_max_stored_chunk_bytes(u64::MAX);
        assert!(matches!(
            limits.validate(),
            Err(LimitsError::ChunkAboveHardCap(_))
        ));
    }

    #[test]
    fn test_zero_manifest_limit_rejected() {
        let limits = BundleLimits::new().with_max_manifest_bytes(0);
        assert_eq!(limits.validate(), Err(LimitsError::ZeroManifestLimit));
    }
}
