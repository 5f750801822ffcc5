//! Delta-varint encoding for sorted index sets
//!
//! Selections, highlight groups and filtered subsets are all sets of row
//! indices. Sorted, their gaps are small, so storing the gaps as varints is
//! far more compact than a raw `u32` array.
//!
//! ## Format
//!
//! ```text
//! count: varint
//! delta[0] = value[0]: varint
//! delta[i] = value[i] - value[i-1]: varint
//! ```
//!
//! Bytes after the last delta are ignored.

use crate::error::{CodecError, CodecResult};
use crate::varint;
use tokio_util::sync::CancellationToken;

/// How many elements are decoded between cancellation checks
pub const CANCEL_CHECK_STRIDE: usize = 64 * 1024;

/// Limits and hooks applied while decoding
#[derive(Debug, Clone, Default)]
pub struct DeltaDecodeOptions {
    /// Reject sets declaring more than this many elements
    pub max_count: Option<usize>,
    /// Reject sets containing an index above this value
    pub max_index: Option<u32>,
    /// Checked every [`CANCEL_CHECK_STRIDE`] elements
    pub cancel: Option<CancellationToken>,
}

impl DeltaDecodeOptions {
    /// Options with no limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the element count limit (builder pattern)
    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }

    /// Set the maximum index (builder pattern)
    pub fn with_max_index(mut self, max_index: u32) -> Self {
        self.max_index = Some(max_index);
        self
    }

    /// Attach a cancellation token (builder pattern)
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Encode an index set
///
/// The input is sorted before encoding; duplicates are kept.
pub fn encode(indices: &[u32]) -> Vec<u8> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();

    // Small gaps dominate in practice: ~1-2 bytes per element
    let mut out = Vec::with_capacity(varint::MAX_VARINT_LEN + sorted.len() * 2);
    varint::encode_into(&mut out, sorted.len() as u64);

    let mut previous = 0u32;
    for value in sorted {
        varint::encode_into(&mut out, u64::from(value - previous));
        previous = value;
    }
    out
}

/// Decode an index set produced by [`encode`]
pub fn decode(bytes: &[u8], options: &DeltaDecodeOptions) -> CodecResult<Vec<u32>> {
    let (count, mut offset) = varint::decode(bytes, 0)?;

    if let Some(max_count) = options.max_count {
        if count > max_count as u64 {
            return Err(CodecError::bounds("count", count, max_count as u64));
        }
    }

    // Every delta takes at least one byte, so a lying count cannot
    // reserve more than the input could ever fill.
    let remaining = bytes.len().saturating_sub(offset);
    let capacity = usize::try_from(count).unwrap_or(usize::MAX).min(remaining);
    let mut out = Vec::with_capacity(capacity);

    let max_index = options.max_index.map(u64::from).unwrap_or(u64::from(u32::MAX));
    let mut running: u64 = 0;

    for i in 0..count {
        if i as usize % CANCEL_CHECK_STRIDE == 0 {
            if let Some(cancel) = &options.cancel {
                if cancel.is_cancelled() {
                    return Err(CodecError::Cancelled);
                }
            }
        }

        let (delta, next) = varint::decode(bytes, offset)?;
        offset = next;

        running = running.saturating_add(delta);
        if running > max_index {
            return Err(CodecError::bounds("index", running, max_index));
        }
        out.push(running as u32);
    }

    Ok(out)
}
