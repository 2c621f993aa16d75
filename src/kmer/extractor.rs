//! K-mer extraction: DNA2 direct extraction and DNA4 degenerate expansion.
//!
//! Both functions read 2-bit/4-bit codes straight out of
//! [`crate::sequence::BitPackedSequence`]'s backing bytes and write into a
//! single allocation sized to the exact output count. Neither builds an
//! intermediate bit-packed k-mer object.

use super::{validate_k, KmerWidth, DEFAULT_MAX_WINDOW_EXPANSIONS};
use crate::error::KmerResult;
use crate::sequence::BitPackedSequence;

/// A k-mer output array, stored at the narrowest integer width that fits
/// `2 * k` bits (see [`KmerWidth`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmerArray {
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl KmerArray {
    pub fn len(&self) -> usize {
        match self {
            KmerArray::U16(v) => v.len(),
            KmerArray::U32(v) => v.len(),
            KmerArray::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> KmerWidth {
        match self {
            KmerArray::U16(_) => KmerWidth::U16,
            KmerArray::U32(_) => KmerWidth::U32,
            KmerArray::U64(_) => KmerWidth::U64,
        }
    }

    /// Iterate k-mer values widened to `u64`, regardless of storage width.
    pub fn iter_u64(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match self {
            KmerArray::U16(v) => Box::new(v.iter().map(|&x| x as u64)),
            KmerArray::U32(v) => Box::new(v.iter().map(|&x| x as u64)),
            KmerArray::U64(v) => Box::new(v.iter().copied()),
        }
    }

    fn with_capacity(width: KmerWidth, cap: usize) -> Self {
        match width {
            KmerWidth::U16 => KmerArray::U16(Vec::with_capacity(cap)),
            KmerWidth::U32 => KmerArray::U32(Vec::with_capacity(cap)),
            KmerWidth::U64 => KmerArray::U64(Vec::with_capacity(cap)),
        }
    }

    fn push(&mut self, value: u64) {
        match self {
            KmerArray::U16(v) => v.push(value as u16),
            KmerArray::U32(v) => v.push(value as u32),
            KmerArray::U64(v) => v.push(value),
        }
    }
}

fn read_2bit(data: &[u8], index: usize) -> u64 {
    let byte = data[index / 4];
    let slot = index % 4;
    ((byte >> (6 - 2 * slot)) & 0b11) as u64
}

fn read_4bit(data: &[u8], index: usize) -> u8 {
    let byte = data[index / 2];
    if index % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0F
    }
}

fn window_mask(k: usize) -> u64 {
    let bits = 2 * k;
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Extract all DNA2 k-mers in strictly increasing start-position order.
/// `base_count < k` returns an empty array with no allocation.
pub fn extract_dna2_kmers(seq: &BitPackedSequence, k: usize) -> KmerResult<(KmerArray, usize)> {
    validate_k(k)?;
    let base_count = seq.base_count(2)?;
    let width = KmerWidth::for_k(k);

    if base_count < k {
        return Ok((KmerArray::with_capacity(width, 0), 0));
    }

    let count = base_count - k + 1;
    let data = seq.as_bytes();
    let mask = window_mask(k);
    let mut out = KmerArray::with_capacity(width, count);

    let mut cur: u64 = 0;
    for j in 0..k - 1 {
        cur = (cur << 2) | read_2bit(data, j);
    }
    for s in 0..count {
        let j = s + k - 1;
        cur = ((cur << 2) | read_2bit(data, j)) & mask;
        out.push(cur);
    }

    Ok((out, count))
}

/// Ascending 2-bit codes (A<C<G<T) a DNA4 nibble expands to.
fn expansion_codes(nibble: u8) -> Vec<u8> {
    (0..4u8).filter(|bit| nibble & (1 << bit) != 0).collect()
}

/// Extract all DNA4 k-mers with degenerate-code expansion. Returns the
/// k-mer array, its count, and the number of windows skipped because
/// their Cartesian-product expansion exceeded `max_window_expansions`.
pub fn extract_dna4_kmers_expanded(
    seq: &BitPackedSequence,
    k: usize,
    max_window_expansions: u32,
) -> KmerResult<(KmerArray, usize, u32)> {
    validate_k(k)?;
    let base_count = seq.base_count(4)?;
    let width = KmerWidth::for_k(k);

    if base_count < k {
        return Ok((KmerArray::with_capacity(width, 0), 0, 0));
    }

    let data = seq.as_bytes();
    let window_count = base_count - k + 1;

    // First pass: size the output exactly and count skipped windows.
    let mut total = 0usize;
    let mut skipped = 0u32;
    let mut window_sizes = Vec::with_capacity(window_count);
    for s in 0..window_count {
        let mut product: u64 = 1;
        for j in s..s + k {
            let codes = expansion_codes(read_4bit(data, j));
            product *= codes.len() as u64;
            if product > max_window_expansions as u64 {
                break;
            }
        }
        if product > max_window_expansions as u64 {
            skipped += 1;
            window_sizes.push(None);
        } else {
            total += product as usize;
            window_sizes.push(Some(product as usize));
        }
    }

    let mut out = KmerArray::with_capacity(width, total);
    let mut prefixes: Vec<u64> = Vec::new();
    for (s, size) in window_sizes.into_iter().enumerate() {
        if size.is_none() {
            continue;
        }
        prefixes.clear();
        prefixes.push(0);
        for j in s..s + k {
            let codes = expansion_codes(read_4bit(data, j));
            let mut next = Vec::with_capacity(prefixes.len() * codes.len());
            for &prefix in &prefixes {
                for &code in &codes {
                    next.push((prefix << 2) | code as u64);
                }
            }
            prefixes = next;
        }
        for &value in &prefixes {
            out.push(value);
        }
    }

    Ok((out, total, skipped))
}
