//! Host collaborator handles
//!
//! The orchestrator never touches the viewer or the dataset loader
//! directly; it talks to them through these traits.

use cellucid_bundle::DatasetFingerprint;

/// Render handle of the host viewer
pub trait ViewHandle: Send + Sync {
    /// Ask the viewer to redraw once
    fn request_redraw(&self);
}

/// View handle that ignores redraw requests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopView;

impl ViewHandle for NoopView {
    fn request_redraw(&self) {}
}

/// Identity of the dataset currently loaded by the host
pub trait DatasetSource: Send + Sync {
    /// Fingerprint of the loaded dataset, or `None` if nothing is loaded
    fn identity(&self) -> Option<DatasetFingerprint>;
}

/// Dataset source with a fixed identity
#[derive(Debug, Clone, Default)]
pub struct StaticDataset {
    fingerprint: Option<DatasetFingerprint>,
}

impl StaticDataset {
    /// Source reporting `fingerprint`
    pub fn new(fingerprint: DatasetFingerprint) -> Self {
        Self {
            fingerprint: Some(fingerprint),
        }
    }

    /// Source reporting no loaded dataset
    pub fn none() -> Self {
        Self::default()
    }
}

impl DatasetSource for StaticDataset {
    fn identity(&self) -> Option<DatasetFingerprint> {
        self.fingerprint.clone()
    }
}

/// Whether a bundle's fingerprint matches the loaded dataset
///
/// A fingerprint missing on either side never matches.
pub fn fingerprints_match(
    bundle: Option<&DatasetFingerprint>,
    current: Option<&DatasetFingerprint>,
) -> bool {
    match (bundle, current) {
        (Some(bundle), Some(current)) => bundle.matches(current),
        _ => false,
    }
}
