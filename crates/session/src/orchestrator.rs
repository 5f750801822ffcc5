//! Session orchestrator
//!
//! Drives registered contributors through capture and restore.
//!
//! ## Capture
//!
//! Every contributor's `capture` runs in registration order. A failing
//! contributor is logged and skipped; its siblings still run. Records are
//! re-ordered eager-first, validated, serialized, compressed and framed.
//!
//! ## Restore
//!
//! ```text
//! restore_from_source()
//!   ├── retire previous restore (cancel + wait until it has stopped)
//!   ├── open reader, parse manifest, compare fingerprints
//!   ├── eager phase: chunks up to the first lazy entry  ──► Ready / Cancelled / Err
//!   └── lazy phase:  remaining chunks on a spawned task ──► LazyRestore::wait()
//! ```
//!
//! At most one restore is active. Each restore runs under a child of the
//! caller's cancellation token, so a new restore retires the old one without
//! cancelling the caller's token.

use crate::capture::{encode_records, BundleOutput, CaptureOptions, CaptureReport};
use crate::config::SessionConfig;
use crate::context::{SessionContext, SessionPhase};
use crate::contributor::Contributor;
use crate::error::{SessionError, SessionResult};
use crate::host::{fingerprints_match, DatasetSource, NoopView, StaticDataset, ViewHandle};
use crate::notify::{DownloadId, NotificationSink, TracingNotifier};
use crate::restore::{
    decode_payload, ChunkTally, DecodeFailure, Dispatch, LazyOutcome, LazyReport, LazyRestore,
    RestoreOptions, RestoreOutcome, RestoreReport,
};
use crate::scheduler::{Scheduler, TokioScheduler};
use cellucid_bundle::{
    BundleChunk, BundleError, BundleReader, BundleWriteInfo, BundleWriter, ChunkMeta, Compressor,
    GzipCompressor, Manifest, ReadOptions, ReadProgress,
};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type ContributorEntry<S> = (String, Arc<dyn Contributor<S>>);

/// Observable orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing running
    Idle,
    /// A capture is running
    Capturing,
    /// A restore is in its eager phase
    RestoringEager,
    /// A restore is in its background lazy phase
    RestoringLazy,
}

/// Cooperative abort raised while dispatching a chunk
struct Aborted;

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SessionOrchestrator`]
pub struct SessionOrchestratorBuilder<S> {
    state: Arc<S>,
    contributors: Vec<ContributorEntry<S>>,
    duplicate: Option<String>,
    notifications: Arc<dyn NotificationSink>,
    view: Arc<dyn ViewHandle>,
    dataset: Arc<dyn DatasetSource>,
    scheduler: Arc<dyn Scheduler>,
    compressor: Option<Arc<dyn Compressor>>,
    config: SessionConfig,
}

impl<S: Send + Sync + 'static> SessionOrchestratorBuilder<S> {
    /// Register a contributor under `id`
    ///
    /// Chunks are routed back to it by this id at restore time.
    pub fn contributor(self, id: impl Into<String>, contributor: impl Contributor<S> + 'static) -> Self {
        self.shared_contributor(id, Arc::new(contributor))
    }

    /// Register an already shared contributor under `id`
    pub fn shared_contributor(mut self, id: impl Into<String>, contributor: Arc<dyn Contributor<S>>) -> Self {
        let id = id.into();
        if self.contributors.iter().any(|(existing, _)| *existing == id) {
            self.duplicate.get_or_insert(id);
        } else {
            self.contributors.push((id, contributor));
        }
        self
    }

    /// Set the notification sink (default: [`TracingNotifier`])
    pub fn notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }

    /// Set the view handle (default: [`NoopView`])
    pub fn view(mut self, view: Arc<dyn ViewHandle>) -> Self {
        self.view = view;
        self
    }

    /// Set the dataset source (default: no dataset loaded)
    pub fn dataset(mut self, dataset: Arc<dyn DatasetSource>) -> Self {
        self.dataset = dataset;
        self
    }

    /// Set the lazy-phase scheduler (default: [`TokioScheduler`])
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the compressor (default: gzip at the configured level)
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build
    pub fn build(self) -> SessionResult<SessionOrchestrator<S>> {
        if let Some(id) = self.duplicate {
            return Err(SessionError::DuplicateContributor(id));
        }
        self.config.validate()?;

        let compressor = self
            .compressor
            .unwrap_or_else(|| Arc::new(GzipCompressor::new(self.config.gzip_level)));

        debug!(
            target: "cellucid::session",
            contributors = self.contributors.len(),
            codec = compressor.codec_id(),
            "Built session orchestrator"
        );

        Ok(SessionOrchestrator {
            inner: Arc::new(Inner {
                state: self.state,
                contributors: self.contributors,
                notifications: self.notifications,
                view: self.view,
                dataset: self.dataset,
                scheduler: self.scheduler,
                compressor,
                config: self.config,
                status: Mutex::new(Status::default()),
            }),
        })
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

struct Inner<S> {
    state: Arc<S>,
    contributors: Vec<ContributorEntry<S>>,
    notifications: Arc<dyn NotificationSink>,
    view: Arc<dyn ViewHandle>,
    dataset: Arc<dyn DatasetSource>,
    scheduler: Arc<dyn Scheduler>,
    compressor: Arc<dyn Compressor>,
    config: SessionConfig,
    status: Mutex<Status>,
}

#[derive(Default)]
struct Status {
    capturing: bool,
    restore: Option<ActiveRestore>,
    next_restore_id: u64,
}

struct ActiveRestore {
    id: u64,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
    phase: SessionPhase,
}

/// Capture/restore coordinator
///
/// Cloning is cheap; clones share contributors and restore bookkeeping.
pub struct SessionOrchestrator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SessionOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for SessionOrchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.inner.contributors.iter().map(|(id, _)| id.as_str()).collect();
        f.debug_struct("SessionOrchestrator")
            .field("contributors", &ids)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<S: Send + Sync + 'static> SessionOrchestrator<S> {
    /// Start building an orchestrator over shared domain state
    pub fn builder(state: Arc<S>) -> SessionOrchestratorBuilder<S> {
        SessionOrchestratorBuilder {
            state,
            contributors: Vec::new(),
            duplicate: None,
            notifications: Arc::new(TracingNotifier::new()),
            view: Arc::new(NoopView),
            dataset: Arc::new(StaticDataset::none()),
            scheduler: Arc::new(TokioScheduler),
            compressor: None,
            config: SessionConfig::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        let status = self.inner.status.lock();
        match &status.restore {
            Some(active) if active.phase == SessionPhase::Lazy => SessionState::RestoringLazy,
            Some(_) => SessionState::RestoringEager,
            None if status.capturing => SessionState::Capturing,
            None => SessionState::Idle,
        }
    }

    /// Registered contributor ids, in registration order
    pub fn contributor_ids(&self) -> Vec<&str> {
        self.inner.contributors.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Shared domain state
    pub fn domain_state(&self) -> &Arc<S> {
        &self.inner.state
    }

    // -------------------------------------------------------------------------
    // Capture
    // -------------------------------------------------------------------------

    /// Capture every contributor into an in-memory bundle
    pub async fn create_bundle(&self, options: CaptureOptions) -> SessionResult<BundleOutput> {
        let (manifest, chunks, report) = self.capture(options).await?;
        let bytes = BundleWriter::new(self.inner.config.limits)?.write_to_vec(&manifest, &chunks)?;

        info!(
            target: "cellucid::session",
            chunks = report.chunk_count,
            bytes = bytes.len(),
            failed_contributors = report.failed_contributors.len(),
            "Session captured"
        );
        Ok(BundleOutput {
            bytes,
            manifest,
            report,
        })
    }

    /// Capture every contributor and write the bundle to `path` atomically
    pub async fn save_to_path(
        &self,
        path: impl AsRef<Path>,
        options: CaptureOptions,
    ) -> SessionResult<(BundleWriteInfo, CaptureReport)> {
        let (manifest, chunks, report) = self.capture(options).await?;
        let writer = BundleWriter::new(self.inner.config.limits)?;
        let path = path.as_ref().to_path_buf();

        let info = tokio::task::spawn_blocking(move || writer.write_to_path(&manifest, &chunks, &path))
            .await
            .map_err(|e| BundleError::Io(io::Error::other(e)))??;

        info!(
            target: "cellucid::session",
            path = ?info.path,
            bytes = info.total_bytes,
            "Session saved"
        );
        Ok((info, report))
    }

    async fn capture(
        &self,
        options: CaptureOptions,
    ) -> SessionResult<(Manifest, Vec<Vec<u8>>, CaptureReport)> {
        let _guard = CaptureGuard::acquire(&self.inner.status)?;
        let cancel = options.cancel.unwrap_or_default();
        let ctx = self.context(cancel.clone(), SessionPhase::Capture);

        let mut report = CaptureReport::default();
        let mut records = Vec::new();
        for (id, contributor) in &self.inner.contributors {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            match contributor.capture(&ctx).await {
                Ok(chunks) => {
                    debug!(target: "cellucid::session", contributor = %id, chunks = chunks.len(), "Contributor captured");
                    records.extend(chunks);
                }
                Err(e) => {
                    warn!(target: "cellucid::session", contributor = %id, error = %e, "Contributor capture failed; skipping");
                    report.failed_contributors.push(id.clone());
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let (metas, chunks) = encode_records(records, self.inner.compressor.as_ref())?;
        report.chunk_count = metas.len();
        report.eager_count = metas.iter().filter(|m| m.is_eager()).count();
        report.uncompressed_bytes = metas.iter().map(|m| m.uncompressed_bytes).sum();
        report.stored_bytes = metas.iter().map(|m| m.stored_bytes).sum();

        let manifest = Manifest::new(ctx.fingerprint().cloned(), metas);
        Ok((manifest, chunks, report))
    }

    // -------------------------------------------------------------------------
    // Restore
    // -------------------------------------------------------------------------

    /// Restore a bundle from a file
    ///
    /// The file length is used as the progress size hint unless one is given.
    pub async fn restore_from_path(
        &self,
        path: impl AsRef<Path>,
        mut options: RestoreOptions,
    ) -> SessionResult<RestoreOutcome> {
        let file = tokio::fs::File::open(path.as_ref())
            .await
            .map_err(BundleError::from)?;
        if options.size_hint.is_none() {
            let size = file.metadata().await.map_err(BundleError::from)?.len();
            options.size_hint = Some(size);
        }
        self.restore_from_source(BufReader::new(file), options).await
    }

    /// Restore a bundle from an async byte source
    ///
    /// Resolves once the eager phase ends. Lazy chunks, if any, continue on
    /// a background task reachable through [`RestoreReport::lazy`].
    ///
    /// Framing and manifest errors fail the call. Cancellation resolves to
    /// [`RestoreOutcome::Cancelled`], never to an error.
    pub async fn restore_from_source<R>(
        &self,
        source: R,
        options: RestoreOptions,
    ) -> SessionResult<RestoreOutcome>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let guard = self.begin_restore(options.cancel.as_ref()).await;
        let cancel = guard.cancel.clone();
        let sink = Arc::clone(&self.inner.notifications);
        let label = options.label.as_deref().unwrap_or("Session");
        let download = sink.start_download(label, options.size_hint);

        if cancel.is_cancelled() {
            return Ok(self.report_cancelled(download));
        }

        info!(target: "cellucid::session", restore = guard.id, size_hint = options.size_hint, "Restoring session");

        let progress_sink = Arc::clone(&sink);
        let mut read_options = ReadOptions::new()
            .with_limits(self.inner.config.limits)
            .with_cancel(cancel.clone())
            .with_progress(move |p: ReadProgress| {
                progress_sink.update_download(download, p.bytes_read, p.size_hint)
            });
        if let Some(size_hint) = options.size_hint {
            read_options = read_options.with_size_hint(size_hint);
        }

        let mut reader = match BundleReader::open(source, read_options).await {
            Ok(reader) => reader,
            Err(e) if e.is_cancelled() => return Ok(self.report_cancelled(download)),
            Err(e) => return Err(self.report_failed(download, e.into())),
        };

        let manifest = reader.manifest().clone();
        let ctx = self.context(cancel.clone(), SessionPhase::Eager);
        let dataset_mismatch =
            !fingerprints_match(manifest.dataset_fingerprint.as_ref(), ctx.fingerprint());
        if dataset_mismatch {
            let dependent = manifest.chunks.iter().filter(|c| c.dataset_dependent).count();
            warn!(
                target: "cellucid::session",
                bundle = ?manifest.dataset_fingerprint,
                current = ?ctx.fingerprint(),
                skipped = dependent,
                "Dataset fingerprint mismatch"
            );
            let message = if dependent > 0 {
                format!(
                    "This session was saved for a different dataset; {} dataset-specific item(s) will be skipped",
                    dependent
                )
            } else {
                "This session was saved for a different dataset".to_string()
            };
            sink.warning(&message);
        }

        // Eager phase: everything before the first lazy entry
        let mut eager = ChunkTally::default();
        while reader.peek_meta().is_some_and(ChunkMeta::is_eager) {
            let chunk = match reader.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) if e.is_cancelled() => return Ok(self.report_cancelled(download)),
                Err(e) => return Err(self.report_failed(download, e.into())),
            };

            let dispatch = match self.dispatch_chunk(&ctx, chunk, dataset_mismatch).await {
                Ok(dispatch) => dispatch,
                Err(Aborted) => return Ok(self.report_cancelled(download)),
            };
            match dispatch {
                Dispatch::ContributorFailed {
                    contributor_id,
                    error,
                } if self.inner.config.fail_on_eager_error => {
                    return Err(
                        self.report_failed(download, SessionError::contributor(contributor_id, error))
                    );
                }
                other => eager.record(&other),
            }
        }

        self.inner.view.request_redraw();
        info!(
            target: "cellucid::session",
            restore = guard.id,
            applied = eager.applied,
            skipped = eager.skipped_dataset + eager.skipped_unknown,
            failed = eager.failed,
            "Eager restore finished"
        );

        let lazy = if reader.remaining() == 0 {
            sink.complete_download(download, "Session restored");
            None
        } else {
            guard.set_phase(SessionPhase::Lazy);
            let lazy_ctx = ctx.with_phase(SessionPhase::Lazy);
            Some(self.spawn_lazy(reader, lazy_ctx, guard, download, dataset_mismatch))
        };

        Ok(RestoreOutcome::Ready(RestoreReport {
            eager,
            dataset_mismatch,
            manifest,
            lazy,
        }))
    }

    /// Cancel the active restore, if any
    ///
    /// Returns true if a restore was running.
    pub fn cancel_restore(&self) -> bool {
        let status = self.inner.status.lock();
        match &status.restore {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Register a new restore, then retire the previous one
    ///
    /// The previous restore's token is cancelled and this call waits until
    /// it has fully stopped, so two restores never dispatch concurrently.
    async fn begin_restore(&self, caller: Option<&CancellationToken>) -> RestoreGuard<S> {
        let cancel = caller
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        let (done_tx, done_rx) = watch::channel(false);

        let (id, previous) = {
            let mut status = self.inner.status.lock();
            status.next_restore_id += 1;
            let id = status.next_restore_id;
            let previous = status.restore.replace(ActiveRestore {
                id,
                cancel: cancel.clone(),
                done: done_rx,
                phase: SessionPhase::Eager,
            });
            (id, previous)
        };

        let guard = RestoreGuard {
            inner: Arc::clone(&self.inner),
            id,
            cancel,
            done: done_tx,
        };

        if let Some(previous) = previous {
            debug!(target: "cellucid::session", previous = previous.id, next = id, "Retiring previous restore");
            previous.cancel.cancel();
            let mut done = previous.done;
            loop {
                let finished = *done.borrow_and_update();
                // A closed channel means the previous restore is gone already
                if finished || done.changed().await.is_err() {
                    break;
                }
            }
        }

        guard
    }

    fn spawn_lazy<R>(
        &self,
        mut reader: BundleReader<R>,
        ctx: SessionContext<S>,
        guard: RestoreGuard<S>,
        download: DownloadId,
        dataset_mismatch: bool,
    ) -> LazyRestore
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let this = self.clone();
        let cancel = ctx.cancel().clone();
        let handle = tokio::spawn(async move {
            let outcome = this
                .run_lazy(&mut reader, &ctx, download, dataset_mismatch)
                .await;
            drop(guard);
            outcome
        });
        LazyRestore::new(handle, cancel)
    }

    async fn run_lazy<R>(
        &self,
        reader: &mut BundleReader<R>,
        ctx: &SessionContext<S>,
        download: DownloadId,
        dataset_mismatch: bool,
    ) -> LazyOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        let sink = &self.inner.notifications;
        let mut tally = ChunkTally::default();

        loop {
            if ctx.is_cancelled() {
                self.report_cancelled(download);
                return LazyOutcome::Cancelled;
            }

            let chunk = match reader.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) if e.is_cancelled() => {
                    self.report_cancelled(download);
                    return LazyOutcome::Cancelled;
                }
                Err(e) => {
                    error!(target: "cellucid::session", error = %e, "Lazy restore failed");
                    let message = format!("Background session restore failed: {}", e);
                    sink.error(&message);
                    sink.fail_download(download, &message);
                    return LazyOutcome::Failed(e.to_string());
                }
            };

            match self.dispatch_chunk(ctx, chunk, dataset_mismatch).await {
                Ok(dispatch) => tally.record(&dispatch),
                Err(Aborted) => {
                    self.report_cancelled(download);
                    return LazyOutcome::Cancelled;
                }
            }

            if self.inner.config.yield_between_lazy_chunks && reader.remaining() > 0 {
                self.inner.scheduler.yield_now().await;
            }
        }

        self.inner.view.request_redraw();
        sink.complete_download(download, "Session restored");
        info!(
            target: "cellucid::session",
            applied = tally.applied,
            skipped = tally.skipped_dataset + tally.skipped_unknown,
            failed = tally.failed,
            "Lazy restore finished"
        );
        LazyOutcome::Completed(LazyReport { lazy: tally })
    }

    /// Route one chunk to its contributor
    async fn dispatch_chunk(
        &self,
        ctx: &SessionContext<S>,
        chunk: BundleChunk,
        dataset_mismatch: bool,
    ) -> Result<Dispatch, Aborted> {
        let BundleChunk { meta, bytes, .. } = chunk;
        if ctx.is_cancelled() {
            return Err(Aborted);
        }

        if dataset_mismatch && meta.dataset_dependent {
            debug!(target: "cellucid::session", chunk = %meta.id, "Skipping dataset-dependent chunk");
            return Ok(Dispatch::SkippedDataset);
        }

        let Some(contributor) = self.find_contributor(&meta.contributor_id) else {
            warn!(
                target: "cellucid::session",
                chunk = %meta.id,
                contributor = %meta.contributor_id,
                "No contributor registered for chunk; skipping"
            );
            return Ok(Dispatch::SkippedUnknown);
        };

        let payload = match decode_payload(
            &meta,
            bytes,
            &self.inner.compressor,
            self.inner.config.max_decompressed_chunk_bytes,
            ctx.cancel(),
        )
        .await
        {
            Ok(payload) => payload,
            Err(DecodeFailure::Cancelled) => return Err(Aborted),
            Err(DecodeFailure::Invalid(reason)) => {
                warn!(target: "cellucid::session", chunk = %meta.id, %reason, "Chunk decode failed; skipping");
                self.inner
                    .notifications
                    .warning(&format!("Could not restore '{}': {}", meta.label, reason));
                return Ok(Dispatch::DecodeFailed);
            }
        };

        if ctx.is_cancelled() {
            return Err(Aborted);
        }

        match contributor.restore(ctx, &meta, payload).await {
            Ok(()) => {
                debug!(target: "cellucid::session", chunk = %meta.id, phase = ?ctx.phase(), "Chunk restored");
                Ok(Dispatch::Applied)
            }
            Err(_) if ctx.is_cancelled() => Err(Aborted),
            Err(error) => {
                warn!(
                    target: "cellucid::session",
                    chunk = %meta.id,
                    contributor = %meta.contributor_id,
                    error = %error,
                    "Contributor restore failed"
                );
                self.inner
                    .notifications
                    .warning(&format!("Could not restore '{}': {}", meta.label, error));
                Ok(Dispatch::ContributorFailed {
                    contributor_id: meta.contributor_id,
                    error,
                })
            }
        }
    }

    fn find_contributor(&self, id: &str) -> Option<&Arc<dyn Contributor<S>>> {
        self.inner
            .contributors
            .iter()
            .find(|(registered, _)| registered == id)
            .map(|(_, contributor)| contributor)
    }

    fn context(&self, cancel: CancellationToken, phase: SessionPhase) -> SessionContext<S> {
        SessionContext::new(
            Arc::clone(&self.inner.state),
            cancel,
            Arc::clone(&self.inner.notifications),
            Arc::clone(&self.inner.view),
            Arc::clone(&self.inner.dataset),
            phase,
        )
    }

    fn report_cancelled(&self, download: DownloadId) -> RestoreOutcome {
        info!(target: "cellucid::session", "Restore cancelled");
        self.inner.notifications.info("Restore cancelled");
        self.inner
            .notifications
            .complete_download(download, "Restore cancelled");
        RestoreOutcome::Cancelled
    }

    fn report_failed(&self, download: DownloadId, error: SessionError) -> SessionError {
        warn!(target: "cellucid::session", error = %error, "Restore failed");
        self.inner
            .notifications
            .fail_download(download, &error.to_string());
        error
    }
}

// =============================================================================
// Guards
// =============================================================================

/// Marks a capture as running; captures are not reentrant
struct CaptureGuard<'a> {
    status: &'a Mutex<Status>,
}

impl<'a> CaptureGuard<'a> {
    fn acquire(status: &'a Mutex<Status>) -> SessionResult<Self> {
        let mut locked = status.lock();
        if locked.capturing {
            return Err(SessionError::Busy("a capture is already running".to_string()));
        }
        locked.capturing = true;
        Ok(Self { status })
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.status.lock().capturing = false;
    }
}

/// Owns the active-restore slot until the restore has fully stopped
///
/// Dropping it clears the slot (if still ours) and releases any restore
/// waiting to take over.
struct RestoreGuard<S> {
    inner: Arc<Inner<S>>,
    id: u64,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
}

impl<S> RestoreGuard<S> {
    fn set_phase(&self, phase: SessionPhase) {
        let mut status = self.inner.status.lock();
        if let Some(active) = status.restore.as_mut().filter(|a| a.id == self.id) {
            active.phase = phase;
        }
    }
}

impl<S> Drop for RestoreGuard<S> {
    fn drop(&mut self) {
        {
            let mut status = self.inner.status.lock();
            if status.restore.as_ref().is_some_and(|a| a.id == self.id) {
                status.restore = None;
            }
        }
        self.done.send_replace(true);
    }
}
