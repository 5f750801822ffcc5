//! Compact binary codecs for session payloads
//!
//! These run before generic compression to keep chunk payloads small:
//!
//! - `varint`: unsigned LEB128-style integers
//! - `delta`: sorted index sets as a count plus varint gaps
//! - `table`: a self-describing columnar blob (raw numeric, bit-packed
//!   boolean, dictionary-encoded string columns)

#![warn(clippy::all)]

pub mod delta;
pub mod error;
pub mod table;
pub mod varint;

pub use delta::{DeltaDecodeOptions, CANCEL_CHECK_STRIDE};
pub use error::{CodecError, CodecResult};
pub use table::{
    decode_table, encode_table, read_header, Column, ColumnData, ColumnEncoding, ColumnHeader,
    DType, Table, TableHeader,
};
