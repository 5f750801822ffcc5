//! Session bundle container
//!
//! A session bundle is a single binary file holding a JSON manifest and an
//! ordered list of chunks, each owned by one contributor.
//!
//! ```text
//! state.cellucid-session
//! ├── "CELLUCID_SESSION\n"
//! ├── u32 LE manifest length + manifest JSON
//! └── per chunk: u32 LE length + stored bytes
//! ```
//!
//! ## Usage
//!
//! Write a bundle:
//! ```ignore
//! let bytes = BundleWriter::with_defaults().write_to_vec(&manifest, &chunks)?;
//! ```
//!
//! Stream it back:
//! ```ignore
//! let mut reader = BundleReader::open(&bytes[..], ReadOptions::new()).await?;
//! while let Some(chunk) = reader.next_chunk().await? {
//!     // chunk.meta, chunk.bytes
//! }
//! ```
//!
//! Everything read from a bundle is untrusted: lengths are capped before
//! allocation, the manifest is shape-checked, and declared sizes are hints.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compression;
pub mod error;
pub mod format;
pub mod manifest;
pub mod reader;
pub mod writer;

pub use compression::{
    compress_chunk, decompress_chunk, CompressionError, Compressor, DecompressOptions,
    GzipCompressor,
};
pub use error::{BundleError, BundleResult};
pub use format::{
    decompressed_cap, BundleLimits, LimitsError, DEFAULT_MAX_DECOMPRESSED_CHUNK_BYTES,
    MAGIC_LEN, MAX_MANIFEST_BYTES, MAX_STORED_CHUNK_BYTES, SESSION_EXTENSION, SESSION_MAGIC,
};
pub use manifest::{ChunkCodec, ChunkKind, ChunkMeta, ChunkPriority, DatasetFingerprint, Manifest};
pub use reader::{
    read_all, read_manifest, BundleChunk, BundleReader, ProgressFn, ReadOptions, ReadProgress,
};
pub use writer::{write_bundle, BundleWriteInfo, BundleWriter};
