//! Chunk compression boundary
//!
//! The bundle format treats compression as an opaque service: the
//! orchestrator hands it stored bytes plus an output bound, and it either
//! returns the decompressed payload or refuses. The bound is what stops a
//! decompression bomb; declared sizes in the manifest are only hints.

use crate::manifest::ChunkCodec;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tokio_util::sync::CancellationToken;

/// Output is produced in blocks of this size; cancellation is checked per block
const DECODE_BLOCK_SIZE: usize = 64 * 1024;

/// Compression service trait.
///
/// # Thread Safety
///
/// Compressors must be `Send + Sync`; one instance is shared by every
/// capture and restore an orchestrator runs.
pub trait Compressor: Send + Sync {
    /// Compress a payload.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Decompress a payload, refusing to produce more than
    /// `options.max_output_bytes`.
    fn decompress(
        &self,
        data: &[u8],
        options: &DecompressOptions,
    ) -> Result<Vec<u8>, CompressionError>;

    /// Codec identifier, matching the manifest's `codec` value.
    fn codec_id(&self) -> &str;
}

/// Bounds applied to one decompression
#[derive(Debug, Clone)]
pub struct DecompressOptions {
    /// Hard cap on output bytes
    pub max_output_bytes: u64,
    /// Checked between output blocks
    pub cancel: Option<CancellationToken>,
}

impl DecompressOptions {
    /// Options with an output cap and no cancellation
    pub fn new(max_output_bytes: u64) -> Self {
        Self {
            max_output_bytes,
            cancel: None,
        }
    }

    /// Attach a cancellation token (builder pattern)
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Compression errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    /// Compression failed.
    #[error("Compress error (codec={codec_id}): {detail}")]
    CompressError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the compression
        codec_id: String,
    },

    /// Decoding failed (invalid stream, corruption).
    #[error("Decode error (codec={codec_id}, data_len={data_len}): {detail}")]
    DecodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the decode
        codec_id: String,
        /// Length of the data that failed to decode
        data_len: usize,
    },

    /// Output would exceed the caller's bound.
    #[error("Decompressed output exceeds limit of {limit} bytes")]
    OutputLimitExceeded {
        /// The bound that was hit
        limit: u64,
    },

    /// Decompression was cancelled.
    #[error("Decompression cancelled")]
    Cancelled,
}

impl CompressionError {
    /// Create a decode error with full diagnostic context.
    pub fn decode(detail: impl Into<String>, codec_id: impl Into<String>, data_len: usize) -> Self {
        CompressionError::DecodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
            data_len,
        }
    }
}

// =============================================================================
// Gzip
// =============================================================================

/// Gzip compressor backed by `flate2`
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    /// Default compression level
    pub const DEFAULT_LEVEL: u32 = 6;

    /// Create a compressor with a level in `0..=9`
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    /// Configured compression level
    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEVEL)
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let fail = |e: std::io::Error| CompressionError::CompressError {
            detail: e.to_string(),
            codec_id: "gzip".to_string(),
        };
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data).map_err(fail)?;
        encoder.finish().map_err(fail)
    }

    fn decompress(
        &self,
        data: &[u8],
        options: &DecompressOptions,
    ) -> Result<Vec<u8>, CompressionError> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        let mut block = vec![0u8; DECODE_BLOCK_SIZE];

        loop {
            if options.is_cancelled() {
                return Err(CompressionError::Cancelled);
            }
            let n = decoder
                .read(&mut block)
                .map_err(|e| CompressionError::decode(e.to_string(), "gzip", data.len()))?;
            if n == 0 {
                return Ok(out);
            }
            if (out.len() + n) as u64 > options.max_output_bytes {
                return Err(CompressionError::OutputLimitExceeded {
                    limit: options.max_output_bytes,
                });
            }
            out.extend_from_slice(&block[..n]);
        }
    }

    fn codec_id(&self) -> &str {
        "gzip"
    }
}

// =============================================================================
// Chunk helpers
// =============================================================================

/// Apply a chunk's declared codec at capture time
pub fn compress_chunk(
    codec: ChunkCodec,
    compressor: &dyn Compressor,
    data: Vec<u8>,
) -> Result<Vec<u8>, CompressionError> {
    match codec {
        ChunkCodec::None => Ok(data),
        ChunkCodec::Gzip => compressor.compress(&data),
    }
}

/// Invert a chunk's codec at restore time, enforcing the output bound
///
/// Uncompressed chunks are held to the same bound as compressed ones.
pub fn decompress_chunk(
    codec: ChunkCodec,
    compressor: &dyn Compressor,
    stored: Vec<u8>,
    options: &DecompressOptions,
) -> Result<Vec<u8>, CompressionError> {
    match codec {
        ChunkCodec::None => {
            if stored.len() as u64 > options.max_output_bytes {
                return Err(CompressionError::OutputLimitExceeded {
                    limit: options.max_output_bytes,
                });
            }
            Ok(stored)
        }
        ChunkCodec::Gzip => compressor.decompress(&stored, options),
    }
}
