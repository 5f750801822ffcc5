//! Shared helpers for session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cellucid_bundle::{ChunkMeta, DatasetFingerprint};
use cellucid_session::{
    CaptureOptions, ChunkPayload, ChunkRecord, Contributor, RecordingNotifier, SessionConfig,
    SessionContext, SessionOrchestrator, StaticDataset, ViewHandle,
};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

// ============================================================================
// Domain state
// ============================================================================

/// Application state touched by test contributors.
#[derive(Default)]
pub struct AppState {
    restored: Mutex<Vec<String>>,
    payloads: Mutex<Vec<ChunkPayload>>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Chunk ids restored so far, in restore order.
    pub fn restored(&self) -> Vec<String> {
        self.restored.lock().clone()
    }

    /// Payloads restored so far, in restore order.
    pub fn payloads(&self) -> Vec<ChunkPayload> {
        self.payloads.lock().clone()
    }
}

// ============================================================================
// ScriptedContributor
// ============================================================================

/// Contributor whose behaviour is fixed up front.
#[derive(Default)]
pub struct ScriptedContributor {
    records: Vec<ChunkRecord>,
    fail_capture: bool,
    fail_restore: Vec<String>,
    block_restore: Option<(String, Arc<Notify>)>,
    block_capture: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedContributor {
    pub fn new(records: Vec<ChunkRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Capture fails with an error.
    pub fn failing_capture() -> Self {
        Self {
            fail_capture: true,
            ..Self::default()
        }
    }

    /// Restoring `id` fails with an error.
    pub fn fail_restore_of(mut self, id: &str) -> Self {
        self.fail_restore.push(id.to_string());
        self
    }

    /// Restoring `id` signals `entered`, then waits until the restore is
    /// cancelled.
    pub fn block_restore_of(mut self, id: &str, entered: Arc<Notify>) -> Self {
        self.block_restore = Some((id.to_string(), entered));
        self
    }

    /// Capture signals `entered`, then waits for `release`.
    pub fn block_capture(mut self, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.block_capture = Some((entered, release));
        self
    }
}

#[async_trait]
impl Contributor<AppState> for ScriptedContributor {
    async fn capture(&self, _ctx: &SessionContext<AppState>) -> anyhow::Result<Vec<ChunkRecord>> {
        if let Some((entered, release)) = &self.block_capture {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail_capture {
            anyhow::bail!("capture exploded");
        }
        Ok(self.records.clone())
    }

    async fn restore(
        &self,
        ctx: &SessionContext<AppState>,
        meta: &ChunkMeta,
        payload: ChunkPayload,
    ) -> anyhow::Result<()> {
        if let Some((id, entered)) = &self.block_restore {
            if *id == meta.id {
                entered.notify_one();
                ctx.cancel().cancelled().await;
                anyhow::bail!("interrupted");
            }
        }
        if self.fail_restore.contains(&meta.id) {
            anyhow::bail!("cannot apply {}", meta.id);
        }
        ctx.state().restored.lock().push(meta.id.clone());
        ctx.state().payloads.lock().push(payload);
        Ok(())
    }
}

// ============================================================================
// Host doubles
// ============================================================================

/// View handle counting redraw requests.
#[derive(Default)]
pub struct CountingView {
    redraws: AtomicUsize,
}

impl CountingView {
    pub fn redraws(&self) -> usize {
        self.redraws.load(Ordering::SeqCst)
    }
}

impl ViewHandle for CountingView {
    fn request_redraw(&self) {
        self.redraws.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn demo_fingerprint() -> DatasetFingerprint {
    DatasetFingerprint::new("local-demo", "pbmc3k")
        .with_cell_count(2700)
        .with_var_count(32738)
}

// ============================================================================
// Harness
// ============================================================================

/// Route library logs to the test output; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Orchestrator plus the doubles it was built with.
pub struct Harness {
    pub orchestrator: SessionOrchestrator<AppState>,
    pub state: Arc<AppState>,
    pub sink: Arc<RecordingNotifier>,
    pub view: Arc<CountingView>,
}

pub fn harness(
    contributors: Vec<(&str, ScriptedContributor)>,
    fingerprint: Option<DatasetFingerprint>,
) -> Harness {
    harness_with_config(contributors, fingerprint, SessionConfig::for_testing())
}

pub fn harness_with_config(
    contributors: Vec<(&str, ScriptedContributor)>,
    fingerprint: Option<DatasetFingerprint>,
    config: SessionConfig,
) -> Harness {
    init_tracing();
    let state = AppState::new();
    let sink = Arc::new(RecordingNotifier::new());
    let view = Arc::new(CountingView::default());
    let dataset = match fingerprint {
        Some(fp) => StaticDataset::new(fp),
        None => StaticDataset::none(),
    };

    let mut builder = SessionOrchestrator::builder(Arc::clone(&state))
        .notifications(sink.clone())
        .view(view.clone())
        .dataset(Arc::new(dataset))
        .config(config);
    for (id, contributor) in contributors {
        builder = builder.contributor(id, contributor);
    }

    Harness {
        orchestrator: builder.build().unwrap(),
        state,
        sink,
        view,
    }
}

/// Capture `records` from a single "core" contributor.
pub async fn capture_bundle(
    records: Vec<ChunkRecord>,
    fingerprint: Option<DatasetFingerprint>,
) -> Vec<u8> {
    let h = harness(vec![("core", ScriptedContributor::new(records))], fingerprint);
    h.orchestrator
        .create_bundle(CaptureOptions::new())
        .await
        .unwrap()
        .bytes
}

pub fn source(bytes: Vec<u8>) -> Cursor<Vec<u8>> {
    Cursor::new(bytes)
}
