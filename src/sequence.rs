//! Bit-packed sequence container
//!
//! The unit of storage consumed by every downstream operation: a byte
//! buffer plus an exact bit length. Bit 0 is the most-significant bit of
//! byte 0. DNA2 packs 4 bases/byte (2 bits each); DNA4 packs 2 bases/byte
//! (4 bits each, high nibble first). The container itself doesn't track
//! which alphabet produced it — callers route it to the matching codec
//! and extractor, mirroring how `modules::seq::sequence::Sequence` pairs
//! raw storage with an `Alphabet` chosen by the caller.

use crate::error::{KmerError, KmerResult};

/// Length in bytes of the wire-format length header (§6).
const WIRE_HEADER_LEN: usize = 4;

/// An immutable, caller-owned bit-packed byte buffer plus its exact bit
/// length. Downstream extractors read directly from `data`; this type
/// never allocates an intermediate bit-packed k-mer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitPackedSequence {
    data: Vec<u8>,
    bit_length: usize,
}

impl BitPackedSequence {
    /// Build from already bit-packed bytes, verifying the invariant that
    /// `bit_length` matches `data`'s capacity and that unused trailing
    /// bits of the last byte are zero.
    pub fn new(data: Vec<u8>, bit_length: usize) -> KmerResult<Self> {
        let required_bytes = (bit_length + 7) / 8;
        if data.len() != required_bytes {
            return Err(KmerError::InvalidInput(format!(
                "bit_length {bit_length} requires {required_bytes} bytes, got {}",
                data.len()
            )));
        }

        let trailing_bits = required_bytes * 8 - bit_length;
        if trailing_bits > 0 {
            let last = data[data.len() - 1];
            if last & ((1u8 << trailing_bits) - 1) != 0 {
                return Err(KmerError::InvalidInput(
                    "trailing unused bits of the last byte must be zero".to_string(),
                ));
            }
        }

        Ok(Self { data, bit_length })
    }

    /// Number of bits stored.
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    /// Number of bases packed at `bits_per_base` (2 for DNA2, 4 for DNA4).
    /// Returns an error if `bit_length` isn't a multiple of `bits_per_base`.
    pub fn base_count(&self, bits_per_base: usize) -> KmerResult<usize> {
        if self.bit_length % bits_per_base != 0 {
            return Err(KmerError::InvalidInput(format!(
                "bit_length {} not divisible by {bits_per_base}",
                self.bit_length
            )));
        }
        Ok(self.bit_length / bits_per_base)
    }

    /// The backing bytes, MSB-first within each byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Parse the wire format: a 4-byte big-endian bit-length header
    /// followed by `ceil(bit_length / 8)` payload bytes.
    pub fn from_wire(wire: &[u8]) -> KmerResult<Self> {
        if wire.len() < WIRE_HEADER_LEN {
            return Err(KmerError::InvalidInput(
                "wire buffer shorter than the 4-byte length header".to_string(),
            ));
        }
        let bit_length = u32::from_be_bytes(wire[0..4].try_into().unwrap()) as usize;
        let required_bytes = (bit_length + 7) / 8;
        let payload = &wire[WIRE_HEADER_LEN..];
        if payload.len() < required_bytes {
            return Err(KmerError::InvalidInput(format!(
                "wire buffer declares {bit_length} bits ({required_bytes} bytes) but only {} payload bytes present",
                payload.len()
            )));
        }
        Self::new(payload[..required_bytes].to_vec(), bit_length)
    }

    /// Serialize to the wire format.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(WIRE_HEADER_LEN + self.data.len());
        out.extend_from_slice(&(self.bit_length as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Tags which alphabet a [`BitPackedSequence`] was packed with. Used by
/// the relation seam and the analysis engine to route rows to the
/// matching codec/extractor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SequenceAlphabet {
    /// 2 bits/base, unambiguous A/C/G/T.
    Dna2,
    /// 4 bits/base, IUPAC degenerate codes.
    Dna4,
}

impl SequenceAlphabet {
    pub fn bits_per_base(self) -> usize {
        match self {
            SequenceAlphabet::Dna2 => 2,
            SequenceAlphabet::Dna4 => 4,
        }
    }
}
