//! K-mer extraction: direct DNA2 extraction and DNA4 degenerate expansion.
//!
//! Both extractors read straight from a [`crate::sequence::BitPackedSequence`]'s
//! backing bytes and write into a single allocation sized to the exact
//! output count — no intermediate bit-packed k-mer object is ever built,
//! per the "intermediate object avoidance" requirement.

pub mod extractor;

use crate::error::{KmerError, KmerResult};

/// Smallest k-mer the extractor supports.
pub const MIN_K: usize = 4;
/// Largest k-mer the extractor supports.
pub const MAX_K: usize = 32;

/// Default ceiling on a single DNA4 window's Cartesian-product expansion
/// before the window is skipped outright. 4^4: the largest expansion a
/// 4-base run of fully degenerate (`N`) positions can produce without
/// the count spilling past what a `u8` diagnostic counter can track
/// per-window in the common case.
pub const DEFAULT_MAX_WINDOW_EXPANSIONS: u32 = 256;

/// Validate that `k` is within the supported range.
pub fn validate_k(k: usize) -> KmerResult<()> {
    if (MIN_K..=MAX_K).contains(&k) {
        Ok(())
    } else {
        Err(KmerError::InvalidInput(format!(
            "k={k} outside supported range [{MIN_K}, {MAX_K}]"
        )))
    }
}

/// The integer width used to store a k-mer (or a k-mer plus occurrence
/// bits), chosen by the smallest type that fits `total_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KmerWidth {
    U16,
    U32,
    U64,
}

impl KmerWidth {
    /// Width for a bare k-mer integer (`occurrence_bitlen = 0`).
    pub fn for_k(k: usize) -> Self {
        Self::for_total_bits(2 * k)
    }

    /// Width policy from the analysis engine: `total_bits = 2k + occurrence_bitlen`.
    pub fn for_total_bits(total_bits: usize) -> Self {
        if total_bits <= 16 {
            KmerWidth::U16
        } else if total_bits <= 32 {
            KmerWidth::U32
        } else {
            KmerWidth::U64
        }
    }

    /// Size in bytes of the stored integer.
    pub fn byte_size(self) -> usize {
        match self {
            KmerWidth::U16 => 2,
            KmerWidth::U32 => 4,
            KmerWidth::U64 => 8,
        }
    }
}
