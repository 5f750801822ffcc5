//! Streaming session bundle reader
//!
//! Reads a container from any async byte source: an in-memory slice, a
//! file, or a network body. The manifest is available as soon as
//! [`BundleReader::open`] returns; chunks are then pulled one at a time
//! with [`BundleReader::next_chunk`], in manifest order.
//!
//! ## Guarantees
//!
//! - At most one chunk (or the manifest) is buffered at a time, and every
//!   length is checked against [`BundleLimits`] before any bytes are read.
//! - Buffers grow with bytes actually received, so a large declared length
//!   on a short stream never allocates the declared size.
//! - Truncation is detected by genuine end-of-stream. The caller's size
//!   hint is used for progress reporting only; when transport compression
//!   sits upstream it may not match the bytes actually delivered.
//! - Cancellation between chunks leaves the reader intact. A cancellation
//!   that interrupts a chunk mid-read, or any framing error, poisons the
//!   reader.

use crate::error::{BundleError, BundleResult};
use crate::format::{decode_len, BundleLimits, LENGTH_FIELD_SIZE, MAGIC_LEN, SESSION_MAGIC};
use crate::manifest::{ChunkMeta, Manifest};
use std::fmt;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Initial buffer reservation for a frame; larger frames grow as bytes arrive
const INITIAL_FRAME_CAPACITY: usize = 64 * 1024;

/// Progress callback, invoked after the manifest and after each chunk
pub type ProgressFn = Box<dyn FnMut(ReadProgress) + Send>;

/// Progress snapshot delivered to [`ProgressFn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadProgress {
    /// Bytes consumed from the source so far
    pub bytes_read: u64,
    /// Caller-supplied total size, if any (advisory)
    pub size_hint: Option<u64>,
    /// Chunks read so far
    pub chunks_read: usize,
    /// Chunks listed in the manifest
    pub chunk_count: usize,
}

/// Options for opening a reader
#[derive(Default)]
pub struct ReadOptions {
    /// Advisory total size, for progress UI only
    pub size_hint: Option<u64>,
    /// Size limits
    pub limits: BundleLimits,
    /// Cancellation signal
    pub cancel: Option<CancellationToken>,
    /// Progress callback
    pub progress: Option<ProgressFn>,
}

impl ReadOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size hint (builder pattern)
    pub fn with_size_hint(mut self, size_hint: u64) -> Self {
        self.size_hint = Some(size_hint);
        self
    }

    /// Set limits (builder pattern)
    pub fn with_limits(mut self, limits: BundleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Attach a cancellation token (builder pattern)
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Attach a progress callback (builder pattern)
    pub fn with_progress(mut self, progress: impl FnMut(ReadProgress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("size_hint", &self.size_hint)
            .field("limits", &self.limits)
            .field("cancel", &self.cancel.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// One chunk as stored in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleChunk {
    /// Position in the manifest
    pub index: usize,
    /// Manifest entry for this chunk
    pub meta: ChunkMeta,
    /// Stored bytes (still compressed, if the codec says so)
    pub bytes: Vec<u8>,
}

/// Forward-only reader over a session bundle
pub struct BundleReader<R> {
    source: R,
    manifest: Manifest,
    next_index: usize,
    bytes_read: u64,
    options: ReadOptions,
    poisoned: bool,
}

impl<R: AsyncRead + Unpin> BundleReader<R> {
    /// Validate the framing header and parse the manifest
    ///
    /// Fails with `NotASessionBundle` on a bad or missing magic prefix,
    /// `CorruptBundle` on an oversized, truncated or non-JSON manifest, and
    /// `InvalidManifest` on a manifest of the wrong shape. A cancellation
    /// while the header is still arriving fails with `Cancelled`.
    pub async fn open(mut source: R, options: ReadOptions) -> BundleResult<Self> {
        options.limits.validate()?;
        if is_cancelled(&options.cancel) {
            return Err(BundleError::Cancelled);
        }

        let limits = options.limits;
        let header = read_header(&mut source, &limits);
        let (manifest, manifest_len) = match options.cancel.clone() {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(BundleError::Cancelled),
                result = header => result,
            },
            None => header.await,
        }?;

        debug!(
            target: "cellucid::bundle",
            chunks = manifest.chunks.len(),
            manifest_bytes = manifest_len,
            "Opened session bundle"
        );

        let mut reader = Self {
            source,
            manifest,
            next_index: 0,
            bytes_read: (MAGIC_LEN + LENGTH_FIELD_SIZE) as u64 + manifest_len,
            options,
            poisoned: false,
        };
        reader.report_progress();
        Ok(reader)
    }

    /// The parsed manifest
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Bytes consumed from the source so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Number of chunks not yet read
    pub fn remaining(&self) -> usize {
        self.manifest.chunks.len() - self.next_index
    }

    /// Manifest entry of the next chunk, without reading it
    pub fn peek_meta(&self) -> Option<&ChunkMeta> {
        self.manifest.chunks.get(self.next_index)
    }

    /// Read the next chunk
    ///
    /// Returns `Ok(None)` once every manifest entry has been read.
    pub async fn next_chunk(&mut self) -> BundleResult<Option<BundleChunk>> {
        if self.poisoned {
            return Err(BundleError::corrupt("reader failed earlier; bundle abandoned"));
        }
        if self.next_index >= self.manifest.chunks.len() {
            return Ok(None);
        }
        if is_cancelled(&self.options.cancel) {
            return Err(BundleError::Cancelled);
        }

        match self.read_chunk().await {
            Ok(chunk) => Ok(Some(chunk)),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Give up the reader, keeping the manifest
    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }

    async fn read_chunk(&mut self) -> BundleResult<BundleChunk> {
        let index = self.next_index;
        let meta = self.manifest.chunks[index].clone();
        let max = self.options.limits.max_stored_chunk_bytes;
        let cancel = self.options.cancel.clone();
        let what = format!("chunk {} ('{}')", index, meta.id);
        let source = &mut self.source;

        let frame = async move {
            let len = u64::from(read_len(&mut *source, &what).await?);
            if len > max {
                return Err(BundleError::corrupt(format!(
                    "{} length {} exceeds limit {}",
                    what, len, max
                )));
            }
            read_frame(&mut *source, len, &what).await
        };

        let bytes = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(BundleError::Cancelled),
                result = frame => result,
            },
            None => frame.await,
        }?;

        if meta.stored_bytes != 0 && meta.stored_bytes != bytes.len() as u64 {
            warn!(
                target: "cellucid::bundle",
                chunk = %meta.id,
                declared = meta.stored_bytes,
                actual = bytes.len(),
                "Stored chunk size differs from manifest hint"
            );
        }

        self.bytes_read += LENGTH_FIELD_SIZE as u64 + bytes.len() as u64;
        self.next_index += 1;
        self.report_progress();

        if self.next_index == self.manifest.chunks.len() {
            debug!(target: "cellucid::bundle", bytes_read = self.bytes_read, "Read all manifest chunks");
        }

        Ok(BundleChunk { index, meta, bytes })
    }

    fn report_progress(&mut self) {
        let snapshot = ReadProgress {
            bytes_read: self.bytes_read,
            size_hint: self.options.size_hint,
            chunks_read: self.next_index,
            chunk_count: self.manifest.chunks.len(),
        };
        if let Some(progress) = self.options.progress.as_mut() {
            progress(snapshot);
        }
    }
}

impl<R> fmt::Debug for BundleReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleReader")
            .field("chunks", &self.manifest.chunks.len())
            .field("next_index", &self.next_index)
            .field("bytes_read", &self.bytes_read)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

/// Read a whole bundle into memory
pub async fn read_all<R: AsyncRead + Unpin>(
    source: R,
    options: ReadOptions,
) -> BundleResult<(Manifest, Vec<BundleChunk>)> {
    let mut reader = BundleReader::open(source, options).await?;
    let mut chunks = Vec::with_capacity(reader.remaining());
    while let Some(chunk) = reader.next_chunk().await? {
        chunks.push(chunk);
    }
    Ok((reader.into_manifest(), chunks))
}

/// Read only the manifest, for inspection
pub async fn read_manifest<R: AsyncRead + Unpin>(
    source: R,
    options: ReadOptions,
) -> BundleResult<Manifest> {
    Ok(BundleReader::open(source, options).await?.into_manifest())
}

// =============================================================================
// Internal helpers
// =============================================================================

fn is_cancelled(cancel: &Option<CancellationToken>) -> bool {
    cancel.as_ref().is_some_and(|c| c.is_cancelled())
}

/// Read the magic prefix and the manifest frame
async fn read_header<R: AsyncRead + Unpin>(
    source: &mut R,
    limits: &BundleLimits,
) -> BundleResult<(Manifest, u64)> {
    let mut magic = [0u8; MAGIC_LEN];
    match source.read_exact(&mut magic).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(BundleError::NotASessionBundle),
        Err(e) => return Err(e.into()),
    }
    if &magic != SESSION_MAGIC {
        return Err(BundleError::NotASessionBundle);
    }

    let manifest_len = u64::from(read_len(&mut *source, "manifest length").await?);
    if manifest_len > limits.max_manifest_bytes {
        return Err(BundleError::corrupt(format!(
            "manifest length {} exceeds limit {}",
            manifest_len, limits.max_manifest_bytes
        )));
    }

    let manifest_bytes = read_frame(&mut *source, manifest_len, "manifest").await?;
    Ok((Manifest::parse(&manifest_bytes)?, manifest_len))
}

/// Read a length field; end-of-stream here means the bundle is truncated
async fn read_len<R: AsyncRead + Unpin>(source: &mut R, what: &str) -> BundleResult<u32> {
    let mut len_bytes = [0u8; LENGTH_FIELD_SIZE];
    match source.read_exact(&mut len_bytes).await {
        Ok(_) => Ok(decode_len(len_bytes)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(BundleError::corrupt(format!(
            "truncated: stream ended before {} length",
            what
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Read exactly `len` bytes, growing the buffer as data arrives
async fn read_frame<R: AsyncRead + Unpin>(source: &mut R, len: u64, what: &str) -> BundleResult<Vec<u8>> {
    let mut buf = Vec::with_capacity((len as usize).min(INITIAL_FRAME_CAPACITY));
    let n = (&mut *source).take(len).read_to_end(&mut buf).await?;
    if (n as u64) < len {
        return Err(BundleError::corrupt(format!(
            "truncated: {} declares {} bytes, stream ended after {}",
            what, len, n
        )));
    }
    Ok(buf)
}
