//! Cellucid - session bundle engine for interactive visualization state
//!
//! A session bundle is a single portable file holding everything needed to
//! bring a viewer back to where the user left it. Capture asks every
//! registered contributor for its chunks; restore streams them back in two
//! tiers so the view becomes usable before the heavy chunks arrive.
//!
//! # Quick Start
//!
//! ```ignore
//! use cellucid::session::{CaptureOptions, RestoreOptions, SessionOrchestrator};
//!
//! let orchestrator = SessionOrchestrator::builder(state)
//!     .contributor("camera", CameraContributor)
//!     .build()?;
//!
//! orchestrator.save_to_path("view.cellucid-session", CaptureOptions::new()).await?;
//! let outcome = orchestrator
//!     .restore_from_path("view.cellucid-session", RestoreOptions::new())
//!     .await?;
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: compact payload codecs (varint, delta index sets, columnar tables)
//! - [`bundle`]: the container format, manifest model and streaming reader
//! - [`session`]: contributors, capture, two-tier restore and cancellation

pub use cellucid_bundle as bundle;
pub use cellucid_codec as codec;
pub use cellucid_session as session;

pub use cellucid_bundle::{BundleError, BundleResult, ChunkMeta, DatasetFingerprint, Manifest};
pub use cellucid_session::{
    async_trait, CaptureOptions, ChunkPayload, ChunkRecord, Contributor, RestoreOptions,
    RestoreOutcome, SessionConfig, SessionContext, SessionError, SessionOrchestrator,
    SessionResult,
};
