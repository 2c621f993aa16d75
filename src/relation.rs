//! Host-database seam.
//!
//! `RelationSource` stands in for the out-of-scope heap-scan/SPI/catalog
//! machinery of a real relational database: the analysis engine and
//! index-key extractor only ever see this trait, never a concrete
//! storage engine. Production embedders implement it against their own
//! block/row addressing; test code uses the in-memory implementation
//! below.

use crate::sequence::{BitPackedSequence, SequenceAlphabet};

pub type RowId = u64;
pub type BlockId = u64;

/// A scannable column of bit-packed sequences, partitioned into blocks
/// so scan workers can claim disjoint units of work.
pub trait RelationSource: Send + Sync {
    /// Number of blocks available to scan.
    fn block_count(&self) -> BlockId;

    /// Row identifiers contained in `block_id`.
    fn rows_in_block(&self, block_id: BlockId) -> Vec<RowId>;

    /// The bit-packed sequence stored at `row_id`.
    fn column_value(&self, row_id: RowId) -> BitPackedSequence;

    /// The alphabet every row in this relation is packed with.
    fn alphabet(&self) -> SequenceAlphabet;
}

/// An in-memory `RelationSource` over a fixed set of rows, split evenly
/// into blocks. Used by tests and by callers without a real database.
pub struct InMemoryRelation {
    rows: Vec<(RowId, BitPackedSequence)>,
    alphabet: SequenceAlphabet,
    rows_per_block: usize,
}

impl InMemoryRelation {
    pub fn new(
        rows: Vec<(RowId, BitPackedSequence)>,
        alphabet: SequenceAlphabet,
        rows_per_block: usize,
    ) -> Self {
        assert!(rows_per_block > 0, "rows_per_block must be positive");
        Self {
            rows,
            alphabet,
            rows_per_block,
        }
    }
}

impl RelationSource for InMemoryRelation {
    fn block_count(&self) -> BlockId {
        (self.rows.len() as u64 + self.rows_per_block as u64 - 1) / self.rows_per_block as u64
    }

    fn rows_in_block(&self, block_id: BlockId) -> Vec<RowId> {
        let start = block_id as usize * self.rows_per_block;
        let end = (start + self.rows_per_block).min(self.rows.len());
        if start >= self.rows.len() {
            return Vec::new();
        }
        self.rows[start..end].iter().map(|(id, _)| *id).collect()
    }

    fn column_value(&self, row_id: RowId) -> BitPackedSequence {
        self.rows
            .iter()
            .find(|(id, _)| *id == row_id)
            .map(|(_, seq)| seq.clone())
            .expect("row_id must exist in the relation")
    }

    fn alphabet(&self) -> SequenceAlphabet {
        self.alphabet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_dna2;

    #[test]
    fn blocks_partition_rows_evenly() {
        let rows: Vec<_> = (0..10)
            .map(|i| (i as u64, encode_dna2(b"ACGT").unwrap()))
            .collect();
        let relation = InMemoryRelation::new(rows, SequenceAlphabet::Dna2, 3);
        assert_eq!(relation.block_count(), 4);
        assert_eq!(relation.rows_in_block(0).len(), 3);
        assert_eq!(relation.rows_in_block(3).len(), 1);
        assert!(relation.rows_in_block(4).is_empty());
    }

    #[test]
    fn column_value_returns_stored_sequence() {
        let seq = encode_dna2(b"ACGT").unwrap();
        let relation = InMemoryRelation::new(vec![(0, seq.clone())], SequenceAlphabet::Dna2, 1);
        assert_eq!(relation.column_value(0), seq);
    }
}
