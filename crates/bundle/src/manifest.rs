//! Manifest types
//!
//! The manifest is the JSON header of a session bundle. It lists every
//! chunk in stream order and identifies the dataset the session was
//! captured against.
//!
//! Manifests come from untrusted files, so parsing happens in two steps:
//! JSON syntax (a failure means the bundle is corrupt) and then shape
//! (a failure means the manifest is invalid). Enumerated fields are closed
//! enums; unknown values are rejected here rather than downstream.

use crate::error::{BundleError, BundleResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// =============================================================================
// Enumerations
// =============================================================================

/// Restore tier of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPriority {
    /// Restored before the session is reported ready
    Eager,
    /// Restored afterwards, in the background
    Lazy,
}

/// Payload representation of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// UTF-8 JSON document
    Json,
    /// Opaque bytes
    Binary,
}

/// Compression applied to a chunk's stored bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkCodec {
    /// Stored as-is
    #[default]
    None,
    /// Gzip member
    Gzip,
}

impl ChunkPriority {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkPriority::Eager => "eager",
            ChunkPriority::Lazy => "lazy",
        }
    }
}

impl ChunkKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Json => "json",
            ChunkKind::Binary => "binary",
        }
    }
}

impl ChunkCodec {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkCodec::None => "none",
            ChunkCodec::Gzip => "gzip",
        }
    }
}

impl fmt::Display for ChunkPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ChunkCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Dataset fingerprint
// =============================================================================

/// Identity of the dataset a session was captured against
///
/// Only ever compared for equality; it carries no authority beyond the
/// bundle it was written into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFingerprint {
    /// Where the dataset was loaded from ("local-demo", "remote", "github", ...)
    pub source_type: String,
    /// Source-specific dataset identifier
    pub dataset_id: String,
    /// Number of cells (observations), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_count: Option<u64>,
    /// Number of variables (genes), if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_count: Option<u64>,
}

impl DatasetFingerprint {
    /// Create a fingerprint without counts
    pub fn new(source_type: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            dataset_id: dataset_id.into(),
            cell_count: None,
            var_count: None,
        }
    }

    /// Set the cell count (builder pattern)
    pub fn with_cell_count(mut self, count: u64) -> Self {
        self.cell_count = Some(count);
        self
    }

    /// Set the variable count (builder pattern)
    pub fn with_var_count(mut self, count: u64) -> Self {
        self.var_count = Some(count);
        self
    }

    /// Whether two fingerprints describe the same dataset
    ///
    /// Source and id must be equal; counts must be equal where both sides
    /// declare them.
    pub fn matches(&self, other: &DatasetFingerprint) -> bool {
        fn counts_agree(a: Option<u64>, b: Option<u64>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        self.source_type == other.source_type
            && self.dataset_id == other.dataset_id
            && counts_agree(self.cell_count, other.cell_count)
            && counts_agree(self.var_count, other.var_count)
    }
}

// =============================================================================
// Chunk metadata
// =============================================================================

/// Manifest entry describing one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    /// Unique chunk id
    pub id: String,
    /// Id of the contributor that owns this chunk
    pub contributor_id: String,
    /// Restore tier
    pub priority: ChunkPriority,
    /// Payload representation
    pub kind: ChunkKind,
    /// Stored-byte compression
    pub codec: ChunkCodec,
    /// Human-readable label for progress UI
    pub label: String,
    /// Skipped when restoring against a different dataset
    pub dataset_dependent: bool,
    /// Declared stored size (hint only)
    #[serde(default)]
    pub stored_bytes: u64,
    /// Declared size before compression (hint only; 0 = not declared)
    #[serde(default)]
    pub uncompressed_bytes: u64,
    /// Ids of chunks this one expects to be restored first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ChunkMeta {
    /// True for eager-tier chunks
    pub fn is_eager(&self) -> bool {
        self.priority == ChunkPriority::Eager
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// Session bundle manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// RFC 3339 timestamp when the bundle was created
    #[serde(default)]
    pub created_at: String,
    /// Dataset the session was captured against
    #[serde(default)]
    pub dataset_fingerprint: Option<DatasetFingerprint>,
    /// Chunk entries in stream order, eager before lazy
    pub chunks: Vec<ChunkMeta>,
}

impl Manifest {
    /// Create a manifest stamped with the current time
    pub fn new(dataset_fingerprint: Option<DatasetFingerprint>, chunks: Vec<ChunkMeta>) -> Self {
        Self {
            created_at: chrono::Utc::now().to_rfc3339(),
            dataset_fingerprint,
            chunks,
        }
    }

    /// Parse manifest bytes
    ///
    /// Invalid JSON is a corrupt bundle; valid JSON of the wrong shape is an
    /// invalid manifest.
    pub fn parse(bytes: &[u8]) -> BundleResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| BundleError::corrupt(format!("manifest is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate and convert a parsed JSON value
    pub fn from_value(value: Value) -> BundleResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(BundleError::invalid_manifest("manifest is not an object"));
        };

        let chunks = match object.remove("chunks") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(BundleError::invalid_manifest("missing chunks array")),
        };

        let created_at = match object.remove("createdAt") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(_) => return Err(BundleError::invalid_manifest("createdAt is not a string")),
        };

        let dataset_fingerprint = match object.remove("datasetFingerprint") {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_json::from_value(value).map_err(|e| {
                BundleError::invalid_manifest(format!("datasetFingerprint: {}", e))
            })?),
        };

        let mut metas = Vec::with_capacity(chunks.len());
        for (i, entry) in chunks.into_iter().enumerate() {
            let meta: ChunkMeta = serde_json::from_value(entry)
                .map_err(|e| BundleError::invalid_manifest(format!("chunks[{}]: {}", i, e)))?;
            if meta.id.is_empty() {
                return Err(BundleError::invalid_manifest(format!(
                    "chunks[{}]: empty id",
                    i
                )));
            }
            if meta.contributor_id.is_empty() {
                return Err(BundleError::invalid_manifest(format!(
                    "chunks[{}]: empty contributorId",
                    i
                )));
            }
            metas.push(meta);
        }

        Ok(Self {
            created_at,
            dataset_fingerprint,
            chunks: metas,
        })
    }

    /// Serialize to UTF-8 JSON
    pub fn to_json_bytes(&self) -> BundleResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Index of the first lazy entry, if any
    pub fn first_lazy_index(&self) -> Option<usize> {
        self.chunks.iter().position(|c| !c.is_eager())
    }

    /// Number of eager entries
    pub fn eager_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_eager()).count()
    }

    /// True if every eager entry precedes every lazy entry
    pub fn is_tier_ordered(&self) -> bool {
        match self.first_lazy_index() {
            Some(first) => self.chunks[first..].iter().all(|c| !c.is_eager()),
            None => true,
        }
    }
}
