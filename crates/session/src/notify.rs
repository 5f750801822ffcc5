//! Progress and notification sink
//!
//! Restores report byte progress as a "download" entry plus free-form
//! info, warning and error messages. Hosts route these to their UI;
//! [`TracingNotifier`] routes them to logs.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Handle to one download entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "download-{}", self.0)
    }
}

/// Sink for user-facing progress and messages
pub trait NotificationSink: Send + Sync {
    /// Open a progress entry; `total_bytes` is advisory
    fn start_download(&self, label: &str, total_bytes: Option<u64>) -> DownloadId;

    /// Report bytes consumed so far
    fn update_download(&self, id: DownloadId, loaded_bytes: u64, total_bytes: Option<u64>);

    /// Close an entry normally
    fn complete_download(&self, id: DownloadId, message: &str);

    /// Close an entry with a failure
    fn fail_download(&self, id: DownloadId, message: &str);

    /// Informational message
    fn info(&self, message: &str);

    /// Non-fatal problem
    fn warning(&self, message: &str);

    /// Failure the user should see
    fn error(&self, message: &str);
}

// =============================================================================
// TracingNotifier
// =============================================================================

/// Sink that writes everything to `tracing`
#[derive(Debug, Default)]
pub struct TracingNotifier {
    next_id: AtomicU64,
}

impl TracingNotifier {
    /// Create a notifier
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationSink for TracingNotifier {
    fn start_download(&self, label: &str, total_bytes: Option<u64>) -> DownloadId {
        let id = DownloadId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(target: "cellucid::session", %id, label, total_bytes, "Download started");
        id
    }

    fn update_download(&self, id: DownloadId, loaded_bytes: u64, total_bytes: Option<u64>) {
        debug!(target: "cellucid::session", %id, loaded_bytes, total_bytes, "Download progress");
    }

    fn complete_download(&self, id: DownloadId, message: &str) {
        info!(target: "cellucid::session", %id, detail = message, "Download finished");
    }

    fn fail_download(&self, id: DownloadId, message: &str) {
        warn!(target: "cellucid::session", %id, detail = message, "Download failed");
    }

    fn info(&self, message: &str) {
        info!(target: "cellucid::session", "{}", message);
    }

    fn warning(&self, message: &str) {
        warn!(target: "cellucid::session", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "cellucid::session", "{}", message);
    }
}

// =============================================================================
// RecordingNotifier
// =============================================================================

/// One event captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `start_download`
    DownloadStarted {
        /// Entry id
        id: DownloadId,
        /// Entry label
        label: String,
        /// Advisory total
        total_bytes: Option<u64>,
    },
    /// `update_download`
    DownloadProgress {
        /// Entry id
        id: DownloadId,
        /// Bytes consumed
        loaded_bytes: u64,
    },
    /// `complete_download`
    DownloadCompleted {
        /// Entry id
        id: DownloadId,
        /// Closing message
        message: String,
    },
    /// `fail_download`
    DownloadFailed {
        /// Entry id
        id: DownloadId,
        /// Failure message
        message: String,
    },
    /// `info`
    Info(String),
    /// `warning`
    Warning(String),
    /// `error`
    Error(String),
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    next_id: AtomicU64,
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }

    /// Info messages so far
    pub fn infos(&self) -> Vec<String> {
        self.collect(|n| match n {
            Notification::Info(m) => Some(m.clone()),
            _ => None,
        })
    }

    /// Warning messages so far
    pub fn warnings(&self) -> Vec<String> {
        self.collect(|n| match n {
            Notification::Warning(m) => Some(m.clone()),
            _ => None,
        })
    }

    /// Error messages so far
    pub fn errors(&self) -> Vec<String> {
        self.collect(|n| match n {
            Notification::Error(m) => Some(m.clone()),
            _ => None,
        })
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn collect(&self, f: impl Fn(&Notification) -> Option<String>) -> Vec<String> {
        self.events.lock().iter().filter_map(f).collect()
    }

    fn push(&self, event: Notification) {
        self.events.lock().push(event);
    }
}

impl NotificationSink for RecordingNotifier {
    fn start_download(&self, label: &str, total_bytes: Option<u64>) -> DownloadId {
        let id = DownloadId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.push(Notification::DownloadStarted {
            id,
            label: label.to_string(),
            total_bytes,
        });
        id
    }

    fn update_download(&self, id: DownloadId, loaded_bytes: u64, _total_bytes: Option<u64>) {
        self.push(Notification::DownloadProgress { id, loaded_bytes });
    }

    fn complete_download(&self, id: DownloadId, message: &str) {
        self.push(Notification::DownloadCompleted {
            id,
            message: message.to_string(),
        });
    }

    fn fail_download(&self, id: DownloadId, message: &str) {
        self.push(Notification::DownloadFailed {
            id,
            message: message.to_string(),
        });
    }

    fn info(&self, message: &str) {
        self.push(Notification::Info(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.push(Notification::Warning(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Notification::Error(message.to_string()));
    }
}
