//! Self-describing columnar table codec
//!
//! Used for per-cell annotations and analysis caches: a handful of named
//! columns, all `rowCount` long, packed into one blob before generic
//! compression.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ header length: u32 LE                        │
//! │ header: UTF-8 JSON                           │
//! │   { rowCount, columns: [{ name, dtype,       │
//! │     encoding, byteLength, ... }] }           │
//! ├──────────────────────────────────────────────┤
//! │ column blocks, in header order               │
//! │   raw:        rowCount * width bytes, LE     │
//! │   bitpack:    ceil(rowCount / 8) bytes, LSB  │
//! │   dictionary: varint-prefixed UTF-8 entries, │
//! │               then rowCount fixed-width      │
//! │               indices                        │
//! └──────────────────────────────────────────────┘
//! ```

use crate::error::{CodecError, CodecResult};
use crate::varint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// Header name used in errors about the header itself
const HEADER_COLUMN: &str = "<header>";

// =============================================================================
// Column types
// =============================================================================

/// Element type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
    Float64,
    Bool,
    String,
}

impl DType {
    /// Width in bytes for fixed-width types
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DType::Uint8 | DType::Int8 => Some(1),
            DType::Uint16 | DType::Int16 => Some(2),
            DType::Uint32 | DType::Int32 | DType::Float32 => Some(4),
            DType::Float64 => Some(8),
            DType::Bool | DType::String => None,
        }
    }

    /// Encoding used for this dtype
    pub fn encoding(&self) -> ColumnEncoding {
        match self {
            DType::Bool => ColumnEncoding::Bitpack,
            DType::String => ColumnEncoding::Dictionary,
            _ => ColumnEncoding::Raw,
        }
    }
}

/// Physical encoding of a column block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnEncoding {
    Raw,
    Bitpack,
    Dictionary,
}

/// Values of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl ColumnData {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            ColumnData::U8(v) => v.len(),
            ColumnData::I8(v) => v.len(),
            ColumnData::U16(v) => v.len(),
            ColumnData::I16(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::I32(v) => v.len(),
            ColumnData::F32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    /// True if the column has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The dtype this column is stored as
    pub fn dtype(&self) -> DType {
        match self {
            ColumnData::U8(_) => DType::Uint8,
            ColumnData::I8(_) => DType::Int8,
            ColumnData::U16(_) => DType::Uint16,
            ColumnData::I16(_) => DType::Int16,
            ColumnData::U32(_) => DType::Uint32,
            ColumnData::I32(_) => DType::Int32,
            ColumnData::F32(_) => DType::Float32,
            ColumnData::F64(_) => DType::Float64,
            ColumnData::Bool(_) => DType::Bool,
            ColumnData::Str(_) => DType::String,
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name, unique within a table
    pub name: String,
    /// Column values
    pub data: ColumnData,
}

/// A set of equal-length named columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    row_count: usize,
    columns: Vec<Column>,
}

impl Table {
    /// Create an empty table with a fixed row count
    pub fn new(row_count: usize) -> Self {
        Self {
            row_count,
            columns: Vec::new(),
        }
    }

    /// Add a column (builder pattern)
    pub fn with_column(mut self, name: impl Into<String>, data: ColumnData) -> CodecResult<Self> {
        self.push_column(name, data)?;
        Ok(self)
    }

    /// Add a column
    ///
    /// The column must have exactly `row_count` rows and a name not yet used.
    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> CodecResult<()> {
        let name = name.into();
        if data.len() != self.row_count {
            return Err(CodecError::invalid_table(format!(
                "column '{}' has {} rows, table has {}",
                name,
                data.len(),
                self.row_count
            )));
        }
        if self.column(&name).is_some() {
            return Err(CodecError::invalid_table(format!(
                "duplicate column '{}'",
                name
            )));
        }
        self.columns.push(Column { name, data });
        Ok(())
    }

    /// Number of rows in every column
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Columns in declaration order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.data)
    }
}

// =============================================================================
// Header
// =============================================================================

/// JSON header describing the column blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableHeader {
    /// Rows per column
    pub row_count: usize,
    /// Column descriptors in block order
    pub columns: Vec<ColumnHeader>,
}

/// Descriptor for one column block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub name: String,
    pub dtype: DType,
    pub encoding: ColumnEncoding,
    /// Total block length, including the dictionary for string columns
    pub byte_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_byte_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dtype: Option<DType>,
}

// =============================================================================
// Encode
// =============================================================================

macro_rules! encode_le {
    ($values:expr, $out:expr) => {{
        for v in $values.iter() {
            $out.extend_from_slice(&v.to_le_bytes());
        }
    }};
}

/// Encode a table into a single blob
pub fn encode_table(table: &Table) -> CodecResult<Vec<u8>> {
    let mut headers = Vec::with_capacity(table.columns.len());
    let mut body = Vec::new();

    for column in &table.columns {
        let start = body.len();
        let dtype = column.data.dtype();
        let mut header = ColumnHeader {
            name: column.name.clone(),
            dtype,
            encoding: dtype.encoding(),
            byte_length: 0,
            dictionary_size: None,
            dictionary_byte_length: None,
            index_dtype: None,
        };

        match &column.data {
            ColumnData::U8(v) => body.extend_from_slice(v),
            ColumnData::I8(v) => encode_le!(v, body),
            ColumnData::U16(v) => encode_le!(v, body),
            ColumnData::I16(v) => encode_le!(v, body),
            ColumnData::U32(v) => encode_le!(v, body),
            ColumnData::I32(v) => encode_le!(v, body),
            ColumnData::F32(v) => encode_le!(v, body),
            ColumnData::F64(v) => encode_le!(v, body),
            ColumnData::Bool(v) => body.extend_from_slice(&pack_bools(v)),
            ColumnData::Str(v) => {
                let dict = encode_dictionary(v, &mut body);
                header.dictionary_size = Some(dict.size);
                header.dictionary_byte_length = Some(dict.byte_length);
                header.index_dtype = Some(dict.index_dtype);
            }
        }

        header.byte_length = body.len() - start;
        headers.push(header);
    }

    let header = TableHeader {
        row_count: table.row_count,
        columns: headers,
    };
    let header_json = serde_json::to_vec(&header)
        .map_err(|e| CodecError::invalid_table(format!("header serialization: {}", e)))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| CodecError::invalid_table("header exceeds u32 length"))?;

    let mut out = Vec::with_capacity(4 + header_json.len() + body.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&body);
    trace!(
        target: "cellucid::codec",
        rows = table.row_count,
        columns = table.columns.len(),
        bytes = out.len(),
        "Encoded table"
    );
    Ok(out)
}

fn pack_bools(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, &bit) in values.iter().enumerate() {
        if bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

struct DictionaryInfo {
    size: usize,
    byte_length: usize,
    index_dtype: DType,
}

fn encode_dictionary(values: &[String], out: &mut Vec<u8>) -> DictionaryInfo {
    let mut entries: Vec<&str> = Vec::new();
    let mut lookup: HashMap<&str, u32> = HashMap::new();
    let mut indices = Vec::with_capacity(values.len());

    for value in values {
        let index = *lookup.entry(value.as_str()).or_insert_with(|| {
            entries.push(value.as_str());
            (entries.len() - 1) as u32
        });
        indices.push(index);
    }

    let dict_start = out.len();
    for entry in &entries {
        varint::encode_into(out, entry.len() as u64);
        out.extend_from_slice(entry.as_bytes());
    }
    let byte_length = out.len() - dict_start;

    let index_dtype = index_dtype_for(entries.len());
    for index in indices {
        match index_dtype {
            DType::Uint8 => out.push(index as u8),
            DType::Uint16 => out.extend_from_slice(&(index as u16).to_le_bytes()),
            _ => out.extend_from_slice(&index.to_le_bytes()),
        }
    }

    DictionaryInfo {
        size: entries.len(),
        byte_length,
        index_dtype,
    }
}

fn index_dtype_for(dictionary_size: usize) -> DType {
    if dictionary_size <= 1 << 8 {
        DType::Uint8
    } else if dictionary_size <= 1 << 16 {
        DType::Uint16
    } else {
        DType::Uint32
    }
}

// =============================================================================
// Decode
// =============================================================================

macro_rules! decode_le {
    ($block:expr, $ty:ty) => {{
        const W: usize = std::mem::size_of::<$ty>();
        $block
            .chunks_exact(W)
            .map(|c| {
                let mut buf = [0u8; W];
                buf.copy_from_slice(c);
                <$ty>::from_le_bytes(buf)
            })
            .collect::<Vec<$ty>>()
    }};
}

/// Parse only the header, returning it and the offset of the first block
pub fn read_header(bytes: &[u8]) -> CodecResult<(TableHeader, usize)> {
    if bytes.len() < 4 {
        return Err(CodecError::truncated(HEADER_COLUMN, 4, bytes.len()));
    }
    let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let available = bytes.len() - 4;
    if header_len > available {
        return Err(CodecError::truncated(HEADER_COLUMN, header_len, available));
    }

    let header: TableHeader = serde_json::from_slice(&bytes[4..4 + header_len])
        .map_err(|e| CodecError::invalid_table(format!("header: {}", e)))?;
    Ok((header, 4 + header_len))
}

/// Decode a blob produced by [`encode_table`]
pub fn decode_table(bytes: &[u8]) -> CodecResult<Table> {
    let (header, mut offset) = read_header(bytes)?;
    let mut table = Table::new(header.row_count);

    for column in &header.columns {
        let available = bytes.len() - offset;
        if column.byte_length > available {
            return Err(CodecError::truncated(
                column.name.clone(),
                column.byte_length,
                available,
            ));
        }
        let block = &bytes[offset..offset + column.byte_length];
        offset += column.byte_length;

        if column.encoding != column.dtype.encoding() {
            return Err(CodecError::invalid_table(format!(
                "column '{}': {:?} cannot use {:?} encoding",
                column.name, column.dtype, column.encoding
            )));
        }

        let data = decode_column(column, block, header.row_count)?;
        table.push_column(column.name.clone(), data)?;
    }

    trace!(target: "cellucid::codec", rows = header.row_count, columns = header.columns.len(), "Decoded table");
    Ok(table)
}

fn decode_column(column: &ColumnHeader, block: &[u8], rows: usize) -> CodecResult<ColumnData> {
    if let Some(width) = column.dtype.fixed_width() {
        expect_length(column, block.len(), rows.checked_mul(width))?;
    }

    let data = match column.dtype {
        DType::Uint8 => ColumnData::U8(block.to_vec()),
        DType::Int8 => ColumnData::I8(decode_le!(block, i8)),
        DType::Uint16 => ColumnData::U16(decode_le!(block, u16)),
        DType::Int16 => ColumnData::I16(decode_le!(block, i16)),
        DType::Uint32 => ColumnData::U32(decode_le!(block, u32)),
        DType::Int32 => ColumnData::I32(decode_le!(block, i32)),
        DType::Float32 => ColumnData::F32(decode_le!(block, f32)),
        DType::Float64 => ColumnData::F64(decode_le!(block, f64)),
        DType::Bool => {
            expect_length(column, block.len(), Some(rows.div_ceil(8)))?;
            ColumnData::Bool(
                (0..rows)
                    .map(|i| block[i / 8] & (1 << (i % 8)) != 0)
                    .collect(),
            )
        }
        DType::String => ColumnData::Str(decode_dictionary(column, block, rows)?),
    };
    Ok(data)
}

fn expect_length(column: &ColumnHeader, actual: usize, expected: Option<usize>) -> CodecResult<()> {
    match expected {
        Some(expected) if expected == actual => Ok(()),
        _ => Err(CodecError::invalid_table(format!(
            "column '{}': byteLength {} inconsistent with rowCount for {:?}",
            column.name, actual, column.dtype
        ))),
    }
}

fn decode_dictionary(column: &ColumnHeader, block: &[u8], rows: usize) -> CodecResult<Vec<String>> {
    let invalid = |msg: &str| CodecError::invalid_table(format!("column '{}': {}", column.name, msg));

    let dict_len = column
        .dictionary_byte_length
        .ok_or_else(|| invalid("missing dictionaryByteLength"))?;
    let dict_size = column
        .dictionary_size
        .ok_or_else(|| invalid("missing dictionarySize"))?;
    if dict_len > block.len() {
        return Err(CodecError::truncated(column.name.clone(), dict_len, block.len()));
    }
    let (dict_bytes, index_bytes) = block.split_at(dict_len);

    // Each entry costs at least one length byte
    let mut entries = Vec::with_capacity(dict_size.min(dict_bytes.len()));
    let mut offset = 0;
    for _ in 0..dict_size {
        let (len, next) = varint::decode(dict_bytes, offset)?;
        let len = usize::try_from(len).map_err(|_| invalid("dictionary entry too long"))?;
        let end = next
            .checked_add(len)
            .filter(|&end| end <= dict_bytes.len())
            .ok_or_else(|| invalid("dictionary entry overruns block"))?;
        let entry = std::str::from_utf8(&dict_bytes[next..end])
            .map_err(|_| invalid("dictionary entry is not UTF-8"))?;
        entries.push(entry.to_string());
        offset = end;
    }

    let index_dtype = column
        .index_dtype
        .ok_or_else(|| invalid("missing indexDtype"))?;
    let indices: Vec<u32> = match index_dtype {
        DType::Uint8 => index_bytes.iter().map(|&b| u32::from(b)).collect(),
        DType::Uint16 => decode_le!(index_bytes, u16)
            .into_iter()
            .map(u32::from)
            .collect(),
        DType::Uint32 => decode_le!(index_bytes, u32),
        other => return Err(invalid(&format!("unsupported index dtype {:?}", other))),
    };
    let width = index_dtype.fixed_width().unwrap_or(4);
    if rows.checked_mul(width) != Some(index_bytes.len()) {
        return Err(invalid("index array length does not match rowCount"));
    }

    indices
        .into_iter()
        .map(|i| {
            entries
                .get(i as usize)
                .cloned()
                .ok_or_else(|| invalid("index outside dictionary"))
        })
        .collect()
}
