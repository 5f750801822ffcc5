//! Session capture and restore orchestration
//!
//! Feature modules implement [`Contributor`] and register with a
//! [`SessionOrchestrator`]. Capture collects their chunk records into a
//! session bundle; restore streams a bundle back and hands each chunk to
//! the contributor that owns it.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = SessionOrchestrator::builder(Arc::new(app_state))
//!     .contributor("core", CoreContributor)
//!     .contributor("highlights", HighlightContributor)
//!     .notifications(sink)
//!     .dataset(dataset)
//!     .build()?;
//!
//! let output = orchestrator.create_bundle(CaptureOptions::new()).await?;
//!
//! let source = std::io::Cursor::new(output.bytes);
//! match orchestrator.restore_from_source(source, RestoreOptions::new()).await? {
//!     RestoreOutcome::Ready(report) => { /* usable; report.lazy continues */ }
//!     RestoreOutcome::Cancelled => {}
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capture;
pub mod config;
pub mod context;
pub mod contributor;
pub mod error;
pub mod host;
pub mod notify;
pub mod orchestrator;
pub mod restore;
pub mod scheduler;

pub use capture::{BundleOutput, CaptureOptions, CaptureReport};
pub use config::{ConfigError, SessionConfig};
pub use context::{SessionContext, SessionPhase};
pub use contributor::{ChunkPayload, ChunkRecord, Contributor};
pub use error::{SessionError, SessionResult};
pub use host::{fingerprints_match, DatasetSource, NoopView, StaticDataset, ViewHandle};
pub use notify::{DownloadId, Notification, NotificationSink, RecordingNotifier, TracingNotifier};
pub use orchestrator::{SessionOrchestrator, SessionOrchestratorBuilder, SessionState};
pub use restore::{
    ChunkTally, LazyOutcome, LazyReport, LazyRestore, RestoreOptions, RestoreOutcome,
    RestoreReport,
};
pub use scheduler::{NoopScheduler, Scheduler, SleepScheduler, TokioScheduler};

pub use async_trait::async_trait;
