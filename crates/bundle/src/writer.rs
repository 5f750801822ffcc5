//! Session bundle writer
//!
//! Frames a manifest and already-encoded chunk buffers into a container:
//! magic, manifest length, manifest JSON, then `(length, bytes)` per chunk.
//! The writer does no encoding or compression of its own.

use crate::error::{BundleError, BundleResult};
use crate::format::{encode_len, BundleLimits, SESSION_MAGIC};
use crate::manifest::Manifest;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Information about a written bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleWriteInfo {
    /// Destination path, for path writes
    pub path: Option<PathBuf>,
    /// Serialized manifest size
    pub manifest_bytes: u64,
    /// Number of chunks written
    pub chunk_count: usize,
    /// Total container size
    pub total_bytes: u64,
}

/// Writer for session bundles
#[derive(Debug, Clone, Default)]
pub struct BundleWriter {
    limits: BundleLimits,
}

impl BundleWriter {
    /// Create a writer enforcing the given limits
    pub fn new(limits: BundleLimits) -> BundleResult<Self> {
        limits.validate()?;
        Ok(Self { limits })
    }

    /// Create a writer enforcing the hard caps
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Write a complete bundle into memory
    pub fn write_to_vec(&self, manifest: &Manifest, chunks: &[Vec<u8>]) -> BundleResult<Vec<u8>> {
        let manifest_json = self.prepare(manifest, chunks)?;
        let total = container_size(&manifest_json, chunks);

        let mut buffer = Vec::with_capacity(total as usize);
        write_frames(&mut buffer, &manifest_json, chunks)?;
        Ok(buffer)
    }

    /// Stream a complete bundle into `writer`
    pub fn write_to<W: Write>(
        &self,
        manifest: &Manifest,
        chunks: &[Vec<u8>],
        mut writer: W,
    ) -> BundleResult<BundleWriteInfo> {
        let manifest_json = self.prepare(manifest, chunks)?;
        write_frames(&mut writer, &manifest_json, chunks)?;
        writer.flush()?;

        Ok(BundleWriteInfo {
            path: None,
            manifest_bytes: manifest_json.len() as u64,
            chunk_count: chunks.len(),
            total_bytes: container_size(&manifest_json, chunks),
        })
    }

    /// Write a bundle to a file
    ///
    /// This is an atomic operation - either the complete bundle is written
    /// or no file is left behind.
    pub fn write_to_path(
        &self,
        manifest: &Manifest,
        chunks: &[Vec<u8>],
        path: &Path,
    ) -> BundleResult<BundleWriteInfo> {
        // Validate before touching the filesystem
        self.prepare(manifest, chunks)?;

        let temp_path = path.with_extension("tmp");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let result = File::create(&temp_path)
            .map_err(BundleError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                let info = self.write_to(manifest, chunks, &mut writer)?;
                let file = writer
                    .into_inner()
                    .map_err(|e| BundleError::Io(e.into_error()))?;
                file.sync_all()?;
                Ok(info)
            });

        match result {
            Ok(info) => {
                fs::rename(&temp_path, path)?;
                debug!(target: "cellucid::bundle", path = ?path, bytes = info.total_bytes, "Wrote session bundle");
                Ok(BundleWriteInfo {
                    path: Some(path.to_path_buf()),
                    ..info
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    /// Serialize the manifest and check every length fits the format
    fn prepare(&self, manifest: &Manifest, chunks: &[Vec<u8>]) -> BundleResult<Vec<u8>> {
        if manifest.chunks.len() != chunks.len() {
            return Err(BundleError::invalid_input(format!(
                "manifest lists {} chunks but {} buffers were given",
                manifest.chunks.len(),
                chunks.len()
            )));
        }

        let manifest_json = manifest.to_json_bytes()?;
        if manifest_json.len() as u64 > self.limits.max_manifest_bytes {
            return Err(BundleError::invalid_input(format!(
                "manifest is {} bytes, limit is {}",
                manifest_json.len(),
                self.limits.max_manifest_bytes
            )));
        }

        for (meta, chunk) in manifest.chunks.iter().zip(chunks) {
            if chunk.len() as u64 > self.limits.max_stored_chunk_bytes {
                return Err(BundleError::invalid_input(format!(
                    "chunk '{}' is {} bytes, limit is {}",
                    meta.id,
                    chunk.len(),
                    self.limits.max_stored_chunk_bytes
                )));
            }
        }

        Ok(manifest_json)
    }
}

/// Frame a bundle with default limits
pub fn write_bundle(manifest: &Manifest, chunks: &[Vec<u8>]) -> BundleResult<Vec<u8>> {
    BundleWriter::with_defaults().write_to_vec(manifest, chunks)
}

fn container_size(manifest_json: &[u8], chunks: &[Vec<u8>]) -> u64 {
    let framing = SESSION_MAGIC.len() + 4 + 4 * chunks.len();
    let payload: usize = manifest_json.len() + chunks.iter().map(Vec::len).sum::<usize>();
    (framing + payload) as u64
}

/// Lengths are already checked against limits, which fit in u32
fn write_frames<W: Write>(writer: &mut W, manifest_json: &[u8], chunks: &[Vec<u8>]) -> BundleResult<()> {
    writer.write_all(SESSION_MAGIC)?;
    writer.write_all(&encode_len(manifest_json.len() as u32))?;
    writer.write_all(manifest_json)?;
    for chunk in chunks {
        writer.write_all(&encode_len(chunk.len() as u32))?;
        writer.write_all(chunk)?;
    }
    Ok(())
}
