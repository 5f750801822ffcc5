//! Restore outcomes and per-chunk decoding

use crate::contributor::ChunkPayload;
use cellucid_bundle::{
    decompress_chunk, decompressed_cap, ChunkCodec, ChunkKind, ChunkMeta, CompressionError,
    Compressor, DecompressOptions, Manifest,
};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Options for one restore
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Advisory total size, for progress only
    pub size_hint: Option<u64>,
    /// Caller's cancellation token
    ///
    /// The restore runs under a child of this token, so retiring the
    /// restore never cancels the caller's token.
    pub cancel: Option<CancellationToken>,
    /// Progress label
    pub label: Option<String>,
}

impl RestoreOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size hint (builder pattern)
    pub fn with_size_hint(mut self, size_hint: u64) -> Self {
        self.size_hint = Some(size_hint);
        self
    }

    /// Attach the caller's cancellation token (builder pattern)
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set the progress label (builder pattern)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Per-phase chunk counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkTally {
    /// Chunks handed to their contributor successfully
    pub applied: usize,
    /// Dataset-dependent chunks skipped on fingerprint mismatch
    pub skipped_dataset: usize,
    /// Chunks whose contributor is not registered
    pub skipped_unknown: usize,
    /// Chunks that failed to decode or whose contributor failed
    pub failed: usize,
}

impl ChunkTally {
    /// Total chunks seen
    pub fn total(&self) -> usize {
        self.applied + self.skipped_dataset + self.skipped_unknown + self.failed
    }

    pub(crate) fn record(&mut self, dispatch: &Dispatch) {
        match dispatch {
            Dispatch::Applied => self.applied += 1,
            Dispatch::SkippedDataset => self.skipped_dataset += 1,
            Dispatch::SkippedUnknown => self.skipped_unknown += 1,
            Dispatch::DecodeFailed | Dispatch::ContributorFailed { .. } => self.failed += 1,
        }
    }
}

/// Result of the eager phase
#[derive(Debug)]
pub struct RestoreReport {
    /// Eager-phase counts
    pub eager: ChunkTally,
    /// True if the bundle's fingerprint did not match the loaded dataset
    pub dataset_mismatch: bool,
    /// Manifest of the restored bundle
    pub manifest: Manifest,
    /// Background phase, if the bundle has lazy chunks
    pub lazy: Option<LazyRestore>,
}

/// Terminal result of a restore call
#[derive(Debug)]
pub enum RestoreOutcome {
    /// Eager phase finished; the session is usable
    Ready(RestoreReport),
    /// Cancelled before the eager phase finished
    Cancelled,
}

impl RestoreOutcome {
    /// True for [`RestoreOutcome::Cancelled`]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RestoreOutcome::Cancelled)
    }

    /// The report, if the eager phase finished
    pub fn into_report(self) -> Option<RestoreReport> {
        match self {
            RestoreOutcome::Ready(report) => Some(report),
            RestoreOutcome::Cancelled => None,
        }
    }
}

/// Result of the lazy phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LazyReport {
    /// Lazy-phase counts
    pub lazy: ChunkTally,
}

/// Terminal state of the lazy phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LazyOutcome {
    /// Every lazy chunk was processed
    Completed(LazyReport),
    /// The restore was cancelled or superseded
    Cancelled,
    /// Reading the bundle failed; already reported to the notification sink
    Failed(String),
}

/// Handle to a background lazy phase
pub struct LazyRestore {
    handle: JoinHandle<LazyOutcome>,
    cancel: CancellationToken,
}

impl LazyRestore {
    pub(crate) fn new(handle: JoinHandle<LazyOutcome>, cancel: CancellationToken) -> Self {
        Self { handle, cancel }
    }

    /// Wait for the lazy phase to finish
    pub async fn wait(self) -> LazyOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => LazyOutcome::Cancelled,
            Err(e) => LazyOutcome::Failed(format!("lazy restore task failed: {}", e)),
        }
    }

    /// Request cancellation; `wait` then reports `Cancelled`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the background task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl fmt::Debug for LazyRestore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRestore")
            .field("finished", &self.handle.is_finished())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// =============================================================================
// Chunk dispatch
// =============================================================================

/// What happened to one chunk
#[derive(Debug)]
pub(crate) enum Dispatch {
    Applied,
    SkippedDataset,
    SkippedUnknown,
    DecodeFailed,
    ContributorFailed {
        contributor_id: String,
        error: anyhow::Error,
    },
}

/// Per-chunk decoding failure
#[derive(Debug)]
pub(crate) enum DecodeFailure {
    Cancelled,
    Invalid(String),
}

/// Invert a chunk's codec and kind
///
/// The output cap is the smaller of the declared uncompressed size and
/// `default_max`. Gzip runs on the blocking pool.
pub(crate) async fn decode_payload(
    meta: &ChunkMeta,
    stored: Vec<u8>,
    compressor: &Arc<dyn Compressor>,
    default_max: u64,
    cancel: &CancellationToken,
) -> Result<ChunkPayload, DecodeFailure> {
    let options = DecompressOptions::new(decompressed_cap(meta.uncompressed_bytes, default_max))
        .with_cancel(cancel.clone());

    let bytes = match meta.codec {
        ChunkCodec::None => decompress_chunk(ChunkCodec::None, compressor.as_ref(), stored, &options),
        ChunkCodec::Gzip => {
            let compressor = Arc::clone(compressor);
            tokio::task::spawn_blocking(move || {
                decompress_chunk(ChunkCodec::Gzip, compressor.as_ref(), stored, &options)
            })
            .await
            .map_err(|e| DecodeFailure::Invalid(format!("decompression task failed: {}", e)))?
        }
    };

    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(CompressionError::Cancelled) => return Err(DecodeFailure::Cancelled),
        Err(e) => return Err(DecodeFailure::Invalid(e.to_string())),
    };

    match meta.kind {
        ChunkKind::Binary => Ok(ChunkPayload::Binary(bytes)),
        ChunkKind::Json => serde_json::from_slice(&bytes)
            .map(ChunkPayload::Json)
            .map_err(|e| DecodeFailure::Invalid(format!("invalid JSON payload: {}", e))),
    }
}
