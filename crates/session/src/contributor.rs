//! Contributor protocol
//!
//! A contributor owns one slice of application state. At capture time it
//! returns zero or more [`ChunkRecord`]s; at restore time it receives each
//! of its chunks back, decoded, in bundle order.
//!
//! Contributors fail with `anyhow::Error`. The orchestrator isolates those
//! failures: one contributor erroring never stops its siblings.
//!
//! Index sets and columnar tables have dedicated constructors and decoders
//! backed by `cellucid-codec`; their failures surface as
//! [`SessionError::Codec`].

use crate::context::SessionContext;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use cellucid_bundle::{ChunkCodec, ChunkKind, ChunkMeta, ChunkPriority};
use cellucid_codec::table::{decode_table, encode_table, Table};
use cellucid_codec::{delta, DeltaDecodeOptions};
use serde_json::Value;

/// Capture/restore participant
#[async_trait]
pub trait Contributor<S>: Send + Sync {
    /// Produce this contributor's chunks
    async fn capture(&self, ctx: &SessionContext<S>) -> anyhow::Result<Vec<ChunkRecord>>;

    /// Apply one previously captured chunk
    async fn restore(
        &self,
        ctx: &SessionContext<S>,
        meta: &ChunkMeta,
        payload: ChunkPayload,
    ) -> anyhow::Result<()>;
}

/// Decoded chunk payload
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkPayload {
    /// Structured value, stored as UTF-8 JSON
    Json(Value),
    /// Opaque bytes
    Binary(Vec<u8>),
}

impl ChunkPayload {
    /// Kind this payload is stored as
    pub fn kind(&self) -> ChunkKind {
        match self {
            ChunkPayload::Json(_) => ChunkKind::Json,
            ChunkPayload::Binary(_) => ChunkKind::Binary,
        }
    }

    /// The JSON value, if this is a JSON payload
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ChunkPayload::Json(value) => Some(value),
            ChunkPayload::Binary(_) => None,
        }
    }

    /// The bytes, if this is a binary payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ChunkPayload::Json(_) => None,
            ChunkPayload::Binary(bytes) => Some(bytes.as_slice()),
        }
    }

    /// Take the JSON value out
    pub fn into_json(self) -> anyhow::Result<Value> {
        match self {
            ChunkPayload::Json(value) => Ok(value),
            ChunkPayload::Binary(_) => anyhow::bail!("expected a JSON payload, got binary"),
        }
    }

    /// Take the bytes out
    pub fn into_bytes(self) -> anyhow::Result<Vec<u8>> {
        match self {
            ChunkPayload::Binary(bytes) => Ok(bytes),
            ChunkPayload::Json(_) => anyhow::bail!("expected a binary payload, got JSON"),
        }
    }

    /// Decode a sorted index set written by [`ChunkRecord::index_set`]
    ///
    /// `options` bounds the count and largest index and carries the
    /// cancellation token; pass `ctx.cancel()` for long selections.
    pub fn decode_index_set(&self, options: &DeltaDecodeOptions) -> SessionResult<Vec<u32>> {
        Ok(delta::decode(self.binary_bytes()?, options)?)
    }

    /// Decode a table written by [`ChunkRecord::table`]
    pub fn decode_table(&self) -> SessionResult<Table> {
        Ok(decode_table(self.binary_bytes()?)?)
    }

    fn binary_bytes(&self) -> SessionResult<&[u8]> {
        self.as_bytes()
            .ok_or_else(|| SessionError::invalid_chunk("expected a binary payload, got JSON"))
    }
}

/// Capture-time chunk record
///
/// Records default to eager, uncompressed, dataset-agnostic, labelled with
/// their id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Unique chunk id
    pub id: String,
    /// Owning contributor id
    pub contributor_id: String,
    /// Restore tier
    pub priority: ChunkPriority,
    /// Declared payload kind
    pub kind: ChunkKind,
    /// Stored-byte compression
    pub codec: ChunkCodec,
    /// Progress label
    pub label: String,
    /// Skip when the dataset does not match
    pub dataset_dependent: bool,
    /// Chunks expected to be restored first
    pub depends_on: Vec<String>,
    /// Payload
    pub payload: ChunkPayload,
}

impl ChunkRecord {
    fn with_payload(id: String, contributor_id: String, payload: ChunkPayload) -> Self {
        Self {
            label: id.clone(),
            id,
            contributor_id,
            priority: ChunkPriority::Eager,
            kind: payload.kind(),
            codec: ChunkCodec::None,
            dataset_dependent: false,
            depends_on: Vec::new(),
            payload,
        }
    }

    /// JSON record
    pub fn json(id: impl Into<String>, contributor_id: impl Into<String>, value: Value) -> Self {
        Self::with_payload(id.into(), contributor_id.into(), ChunkPayload::Json(value))
    }

    /// Binary record
    pub fn binary(
        id: impl Into<String>,
        contributor_id: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self::with_payload(id.into(), contributor_id.into(), ChunkPayload::Binary(bytes))
    }

    /// Binary record holding a delta-encoded index set
    pub fn index_set(
        id: impl Into<String>,
        contributor_id: impl Into<String>,
        indices: &[u32],
    ) -> Self {
        Self::binary(id, contributor_id, delta::encode(indices))
    }

    /// Binary record holding an encoded columnar table
    pub fn table(
        id: impl Into<String>,
        contributor_id: impl Into<String>,
        table: &Table,
    ) -> SessionResult<Self> {
        Ok(Self::binary(id, contributor_id, encode_table(table)?))
    }

    /// Restore in the background tier
    pub fn lazy(mut self) -> Self {
        self.priority = ChunkPriority::Lazy;
        self
    }

    /// Restore before the session is ready
    pub fn eager(mut self) -> Self {
        self.priority = ChunkPriority::Eager;
        self
    }

    /// Compress stored bytes with gzip
    pub fn gzip(mut self) -> Self {
        self.codec = ChunkCodec::Gzip;
        self
    }

    /// Set the progress label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Mark as valid only for the dataset it was captured against
    pub fn dataset_dependent(mut self, dependent: bool) -> Self {
        self.dataset_dependent = dependent;
        self
    }

    /// Declare chunks this one expects to be restored first
    pub fn depends_on<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }
}
