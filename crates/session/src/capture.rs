//! Capture pipeline
//!
//! Turns the chunk records collected from contributors into manifest
//! entries and stored chunk buffers: tier ordering, validation, payload
//! serialization and compression.

use crate::contributor::{ChunkPayload, ChunkRecord};
use crate::error::{SessionError, SessionResult};
use cellucid_bundle::{compress_chunk, ChunkMeta, ChunkPriority, Compressor, Manifest};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Options for one capture
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Checked between contributors
    pub cancel: Option<CancellationToken>,
}

impl CaptureOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a cancellation token (builder pattern)
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Summary of one capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Contributors whose `capture` failed; their chunks are absent
    pub failed_contributors: Vec<String>,
    /// Chunks written
    pub chunk_count: usize,
    /// Eager chunks written
    pub eager_count: usize,
    /// Payload bytes before compression
    pub uncompressed_bytes: u64,
    /// Payload bytes as stored
    pub stored_bytes: u64,
}

/// A captured bundle
#[derive(Debug, Clone)]
pub struct BundleOutput {
    /// Complete container bytes
    pub bytes: Vec<u8>,
    /// Manifest written into the container
    pub manifest: Manifest,
    /// Capture summary
    pub report: CaptureReport,
}

/// Stable partition into eager records followed by lazy records
pub fn order_by_tier(records: Vec<ChunkRecord>) -> Vec<ChunkRecord> {
    let (mut eager, lazy): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| r.priority == ChunkPriority::Eager);
    eager.extend(lazy);
    eager
}

/// Reject records that cannot be written or restored
pub fn validate_records(records: &[ChunkRecord]) -> SessionResult<()> {
    let mut seen = HashSet::with_capacity(records.len());

    for record in records {
        if record.id.is_empty() {
            return Err(SessionError::invalid_chunk(format!(
                "chunk from contributor '{}' has an empty id",
                record.contributor_id
            )));
        }
        if record.contributor_id.is_empty() {
            return Err(SessionError::invalid_chunk(format!(
                "chunk '{}' has an empty contributor id",
                record.id
            )));
        }
        if record.kind != record.payload.kind() {
            return Err(SessionError::invalid_chunk(format!(
                "chunk '{}' declares kind {} but carries a {} payload",
                record.id,
                record.kind,
                record.payload.kind()
            )));
        }
        if !seen.insert(record.id.as_str()) {
            return Err(SessionError::invalid_chunk(format!(
                "duplicate chunk id '{}'",
                record.id
            )));
        }
    }

    Ok(())
}

/// Serialize and compress one record
pub fn encode_record(
    record: ChunkRecord,
    compressor: &dyn Compressor,
) -> SessionResult<(ChunkMeta, Vec<u8>)> {
    let ChunkRecord {
        id,
        contributor_id,
        priority,
        kind,
        codec,
        label,
        dataset_dependent,
        depends_on,
        payload,
    } = record;

    let data = match payload {
        ChunkPayload::Json(value) => serde_json::to_vec(&value).map_err(|e| {
            SessionError::invalid_chunk(format!("chunk '{}' is not serializable: {}", id, e))
        })?,
        ChunkPayload::Binary(bytes) => bytes,
    };
    let uncompressed_bytes = data.len() as u64;
    let stored = compress_chunk(codec, compressor, data)?;

    let meta = ChunkMeta {
        id,
        contributor_id,
        priority,
        kind,
        codec,
        label,
        dataset_dependent,
        stored_bytes: stored.len() as u64,
        uncompressed_bytes,
        depends_on,
    };
    Ok((meta, stored))
}

/// Order, validate and encode a capture's records
pub fn encode_records(
    records: Vec<ChunkRecord>,
    compressor: &dyn Compressor,
) -> SessionResult<(Vec<ChunkMeta>, Vec<Vec<u8>>)> {
    let records = order_by_tier(records);
    validate_records(&records)?;

    let mut metas = Vec::with_capacity(records.len());
    let mut chunks = Vec::with_capacity(records.len());
    for record in records {
        let (meta, stored) = encode_record(record, compressor)?;
        metas.push(meta);
        chunks.push(stored);
    }
    Ok((metas, chunks))
}
