//! Per-operation context handed to contributors

use crate::host::{DatasetSource, ViewHandle};
use crate::notify::NotificationSink;
use cellucid_bundle::DatasetFingerprint;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which part of an operation a contributor is being called from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Building a bundle
    Capture,
    /// Restoring eager chunks; the caller is waiting
    Eager,
    /// Restoring lazy chunks in the background
    Lazy,
}

/// Capability bag built once per capture or restore
///
/// Cloning is cheap; every handle is shared.
pub struct SessionContext<S> {
    state: Arc<S>,
    cancel: CancellationToken,
    notifications: Arc<dyn NotificationSink>,
    view: Arc<dyn ViewHandle>,
    dataset: Arc<dyn DatasetSource>,
    fingerprint: Option<DatasetFingerprint>,
    phase: SessionPhase,
}

impl<S> SessionContext<S> {
    pub(crate) fn new(
        state: Arc<S>,
        cancel: CancellationToken,
        notifications: Arc<dyn NotificationSink>,
        view: Arc<dyn ViewHandle>,
        dataset: Arc<dyn DatasetSource>,
        phase: SessionPhase,
    ) -> Self {
        let fingerprint = dataset.identity();
        Self {
            state,
            cancel,
            notifications,
            view,
            dataset,
            fingerprint,
            phase,
        }
    }

    pub(crate) fn with_phase(mut self, phase: SessionPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Shared domain state
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Cancellation signal of the running operation
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the running operation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Progress and message sink
    pub fn notifications(&self) -> &dyn NotificationSink {
        self.notifications.as_ref()
    }

    /// Viewer render handle
    pub fn view(&self) -> &dyn ViewHandle {
        self.view.as_ref()
    }

    /// Dataset identity query
    pub fn dataset(&self) -> &dyn DatasetSource {
        self.dataset.as_ref()
    }

    /// Fingerprint of the loaded dataset, taken when the operation started
    pub fn fingerprint(&self) -> Option<&DatasetFingerprint> {
        self.fingerprint.as_ref()
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }
}

impl<S> Clone for SessionContext<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
            notifications: Arc::clone(&self.notifications),
            view: Arc::clone(&self.view),
            dataset: Arc::clone(&self.dataset),
            fingerprint: self.fingerprint.clone(),
            phase: self.phase,
        }
    }
}

impl<S> fmt::Debug for SessionContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("phase", &self.phase)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
