//! High-Frequency Analysis Engine (§4.6): a parallel scan of a relation
//! that aggregates per-row k-mer appearance counts into on-disk shards,
//! merges them pairwise, and emits the persistent set of k-mers whose
//! row-appearance count exceeds a configured threshold.
//!
//! Coordinator state — the shared block cursor, shard registry, and
//! cancellation flag — mirrors the primitive choices of the teacher's
//! work-stealing scheduler: `AtomicU64` cursor, `parking_lot::Mutex`
//! registry, `AtomicBool` cancellation.

pub mod merge;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::AnalysisConfig;
use crate::error::{KmerError, KmerResult};
use crate::hashtable::{chained::ChainedTable, u16_table::U16Table, ShardHandle};
use crate::kmer::extractor::{extract_dna2_kmers, extract_dna4_kmers_expanded};
use crate::kmer::KmerWidth;
use crate::relation::{BlockId, RelationSource};
use crate::sequence::SequenceAlphabet;

/// One entry of the persistent High-Frequency Set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighFrequencyEntry {
    pub kmer: u64,
    pub appearance_nrow: u64,
    pub reason: String,
}

/// The result of an analysis run: every k-mer whose appearance count
/// exceeded the threshold.
#[derive(Debug, Clone, Default)]
pub struct HighFrequencySet {
    pub entries: Vec<HighFrequencyEntry>,
}

/// A shard backed by whichever hash table layout matches the run's key
/// width. All shards produced by one `run` share the same width.
pub(crate) enum Shard {
    U16(U16Table),
    U32(ChainedTable<u32>),
    U64(ChainedTable<u64>),
}

impl Shard {
    pub(crate) fn create(width: KmerWidth, path: &Path, hint: u64) -> KmerResult<Self> {
        Ok(match width {
            KmerWidth::U16 => Shard::U16(U16Table::create(path)?),
            KmerWidth::U32 => Shard::U32(ChainedTable::create(path, hint)?),
            KmerWidth::U64 => Shard::U64(ChainedTable::create(path, hint)?),
        })
    }

    pub(crate) fn open(width: KmerWidth, path: &Path) -> KmerResult<Self> {
        Ok(match width {
            KmerWidth::U16 => Shard::U16(U16Table::open(path)?),
            KmerWidth::U32 => Shard::U32(ChainedTable::open(path)?),
            KmerWidth::U64 => Shard::U64(ChainedTable::open(path)?),
        })
    }

    fn add(&mut self, key: u64, delta: u64) -> KmerResult<()> {
        match self {
            Shard::U16(t) => {
                t.add(key as u16, delta);
                Ok(())
            }
            Shard::U32(t) => t.add(key as u32, delta),
            Shard::U64(t) => t.add(key, delta),
        }
    }

    pub(crate) fn iterate(&self) -> Vec<(u64, u64)> {
        match self {
            Shard::U16(t) => t.iterate().into_iter().map(|(k, v)| (k as u64, v)).collect(),
            Shard::U32(t) => t.iterate().into_iter().map(|(k, v)| (k as u64, v)).collect(),
            Shard::U64(t) => t.iterate(),
        }
    }

    fn finalize(&mut self) {
        match self {
            Shard::U16(t) => t.finalize(),
            Shard::U32(t) => t.finalize(),
            Shard::U64(t) => t.finalize(),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        match self {
            Shard::U16(t) => t.path(),
            Shard::U32(t) => t.path(),
            Shard::U64(t) => t.path(),
        }
    }

    pub(crate) fn file_size(&self) -> KmerResult<u64> {
        std::fs::metadata(self.path())
            .map(|m| m.len())
            .map_err(|e| KmerError::io(self.path().to_path_buf(), e))
    }

    /// Merge `other` into `self` (summing counters), unlinking `other`'s
    /// file. Panics if the variants differ — every shard in one run
    /// shares the width computed from the run's configuration.
    pub(crate) fn merge_from(&mut self, other: Shard) -> KmerResult<()> {
        match (self, other) {
            (Shard::U16(dst), Shard::U16(src)) => crate::hashtable::u16_table::merge(dst, src),
            (Shard::U32(dst), Shard::U32(src)) => crate::hashtable::chained::merge(dst, src),
            (Shard::U64(dst), Shard::U64(src)) => crate::hashtable::chained::merge(dst, src),
            _ => unreachable!("all shards in one analysis run share the same key width"),
        }
    }
}

/// Shared coordinator state for one analysis run.
pub struct Coordinator {
    cursor: AtomicU64,
    shards: Mutex<Vec<ShardHandle>>,
    cancelled: AtomicBool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            cursor: AtomicU64::new(0),
            shards: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Request cooperative cancellation; checked between blocks and
    /// between merges.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn next_block(&self, block_count: BlockId) -> Option<BlockId> {
        let id = self.cursor.fetch_add(1, Ordering::Relaxed);
        (id < block_count).then_some(id)
    }

    fn register(&self, path: PathBuf) {
        self.shards.lock().push(ShardHandle { path });
    }

    /// Best-effort removal of every shard path this run ever created,
    /// regardless of whether it has already been consumed by a merge.
    fn sweep(&self) {
        for handle in self.shards.lock().drain(..) {
            let _ = std::fs::remove_file(handle.path);
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn unique_shard_path(temp_dir: &Path) -> PathBuf {
    let pid = std::process::id();
    let suffix: u64 = rand::random();
    temp_dir.join(format!("pg_kmersearch_{pid}_{suffix:016x}"))
}

fn key_width(config: &AnalysisConfig) -> KmerWidth {
    KmerWidth::for_total_bits(2 * config.kmer_size + config.occurrence_bitlen as usize)
}

fn flush_batch(shard: &mut Shard, batch: &mut BTreeMap<u64, u64>) -> KmerResult<()> {
    for (key, delta) in batch.iter() {
        shard.add(*key, *delta)?;
    }
    batch.clear();
    Ok(())
}

/// One scan worker's loop (§4.6 steps 1-5): claim blocks, extract and
/// row-dedup k-mers, flush batches to its own shard, publish the path.
fn scan_worker(
    relation: &dyn RelationSource,
    config: &AnalysisConfig,
    width: KmerWidth,
    temp_dir: &Path,
    coordinator: &Coordinator,
) -> KmerResult<PathBuf> {
    let path = unique_shard_path(temp_dir);
    coordinator.register(path.clone());
    let mut shard = Shard::create(width, &path, config.highfreq_analysis_hashtable_size)?;

    let mut batch: BTreeMap<u64, u64> = BTreeMap::new();
    let mut rows_since_flush: usize = 0;
    let block_count = relation.block_count();

    while let Some(block_id) = coordinator.next_block(block_count) {
        if coordinator.is_cancelled() {
            return Err(KmerError::Cancelled);
        }

        for row_id in relation.rows_in_block(block_id) {
            let seq = relation.column_value(row_id);
            let kmers = match relation.alphabet() {
                SequenceAlphabet::Dna2 => extract_dna2_kmers(&seq, config.kmer_size)?.0,
                SequenceAlphabet::Dna4 => {
                    let (array, _count, skipped) = extract_dna4_kmers_expanded(
                        &seq,
                        config.kmer_size,
                        config.max_window_expansions,
                    )?;
                    if skipped > 0 {
                        log::debug!("row {row_id}: skipped {skipped} over-expansion windows");
                    }
                    array
                }
            };

            let mut seen: HashSet<u64> = HashSet::new();
            for kmer in kmers.iter_u64() {
                if seen.insert(kmer) {
                    *batch.entry(kmer).or_insert(0) += 1;
                }
            }
            rows_since_flush += 1;

            if batch.len() >= config.highfreq_analysis_batch_size
                || rows_since_flush >= config.highfreq_analysis_batch_size
            {
                flush_batch(&mut shard, &mut batch)?;
                rows_since_flush = 0;
            }
        }
    }

    if coordinator.is_cancelled() {
        return Err(KmerError::Cancelled);
    }

    flush_batch(&mut shard, &mut batch)?;
    shard.finalize();
    Ok(path)
}

/// Run the full analysis: scan, merge, threshold filter. Returns the
/// High-Frequency Set, or the first error encountered — in which case
/// every shard this run created has been unlinked before returning.
pub fn run(
    relation: &dyn RelationSource,
    config: &AnalysisConfig,
    temp_dir: &Path,
    coordinator: &Coordinator,
) -> KmerResult<HighFrequencySet> {
    config.validate()?;
    let width = key_width(config);
    let worker_count = config.effective_worker_count();

    let scan_result = if worker_count == 0 {
        scan_worker(relation, config, width, temp_dir, coordinator).map(|p| vec![p])
    } else {
        let results: Vec<KmerResult<PathBuf>> = {
            let mut collected = Vec::new();
            rayon::scope(|s| {
                let (tx, rx) = std::sync::mpsc::channel();
                for _ in 0..worker_count {
                    let tx = tx.clone();
                    s.spawn(move |_| {
                        let result = scan_worker(relation, config, width, temp_dir, coordinator);
                        let _ = tx.send(result);
                    });
                }
                drop(tx);
                for result in rx {
                    if result.is_err() {
                        coordinator.cancel();
                    }
                    collected.push(result);
                }
            });
            collected
        };
        results.into_iter().collect::<KmerResult<Vec<_>>>()
    };

    let shard_paths = match scan_result {
        Ok(paths) => paths,
        Err(e) => {
            coordinator.sweep();
            return Err(e);
        }
    };

    let total_rows: u64 = (0..relation.block_count())
        .map(|b| relation.rows_in_block(b).len() as u64)
        .sum();

    let merge_result = (|| -> KmerResult<HighFrequencySet> {
        let shards = shard_paths
            .into_iter()
            .map(|p| Shard::open(width, &p))
            .collect::<KmerResult<Vec<_>>>()?;

        let survivor = merge::merge_tree(shards, worker_count, &coordinator.cancelled)?;
        let threshold = config.threshold(total_rows);

        let entries = survivor
            .iterate()
            .into_iter()
            .filter(|&(_, count)| count > threshold)
            .map(|(kmer, appearance_nrow)| HighFrequencyEntry {
                kmer,
                appearance_nrow,
                reason: format!("appearance_nrow {appearance_nrow} > threshold {threshold}"),
            })
            .collect();

        Ok(HighFrequencySet { entries })
    })();

    coordinator.sweep();
    merge_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_dna2;
    use crate::relation::InMemoryRelation;
    use tempfile::tempdir;

    fn relation_with(seqs: &[&[u8]]) -> InMemoryRelation {
        let rows = seqs
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u64, encode_dna2(s).unwrap()))
            .collect();
        InMemoryRelation::new(rows, SequenceAlphabet::Dna2, 2)
    }

    #[test]
    fn scenario_4_two_workers_agree_with_inline() {
        // k-mer X appears in rows {1,3} and {2,4} as in the spec's scenario 4.
        let seqs: Vec<&[u8]> = vec![b"AAAA", b"ACGT", b"AAAA", b"ACGT"];
        let relation = relation_with(&seqs);
        let dir = tempdir().unwrap();

        let mut config = AnalysisConfig {
            kmer_size: 4,
            highfreq_max_rate: 1.0,
            highfreq_max_nrow: 0, // threshold = 0, everything with count > 0 qualifies... use rate instead
            ..AnalysisConfig::default()
        };
        config.highfreq_max_nrow = u64::MAX;
        config.highfreq_max_rate = 0.5; // threshold = ceil(4*0.5) = 2

        let coordinator = Coordinator::new();
        let result = run(&relation, &config, dir.path(), &coordinator).unwrap();

        // AAAA appears in rows 0,2 (count=2); ACGT appears in rows 1,3 (count=2).
        // threshold=2, so appearance_nrow > 2 is required: neither qualifies.
        assert!(result.entries.is_empty());
    }

    #[test]
    fn aggregation_independent_of_worker_count() {
        let seqs: Vec<&[u8]> = vec![b"AAAA", b"ACGT", b"AAAA", b"ACGT", b"AAAA"];
        let relation = relation_with(&seqs);

        let mut config = AnalysisConfig {
            kmer_size: 4,
            highfreq_max_rate: 1.0,
            highfreq_analysis_batch_size: 1,
            ..AnalysisConfig::default()
        };
        config.analysis_worker_count = 0;

        let dir_serial = tempdir().unwrap();
        let coordinator_serial = Coordinator::new();
        let serial = run(&relation, &config, dir_serial.path(), &coordinator_serial).unwrap();

        config.analysis_worker_count = 3;
        let dir_parallel = tempdir().unwrap();
        let coordinator_parallel = Coordinator::new();
        let parallel = run(&relation, &config, dir_parallel.path(), &coordinator_parallel).unwrap();

        let mut serial_sorted: Vec<_> = serial
            .entries
            .iter()
            .map(|e| (e.kmer, e.appearance_nrow))
            .collect();
        let mut parallel_sorted: Vec<_> = parallel
            .entries
            .iter()
            .map(|e| (e.kmer, e.appearance_nrow))
            .collect();
        serial_sorted.sort();
        parallel_sorted.sort();
        assert_eq!(serial_sorted, parallel_sorted);
    }

    #[test]
    fn shards_are_all_cleaned_up_after_success() {
        let seqs: Vec<&[u8]> = vec![b"AAAA", b"ACGT"];
        let relation = relation_with(&seqs);
        let dir = tempdir().unwrap();
        let config = AnalysisConfig {
            kmer_size: 4,
            highfreq_max_rate: 1.0,
            ..AnalysisConfig::default()
        };
        let coordinator = Coordinator::new();
        run(&relation, &config, dir.path(), &coordinator).unwrap();

        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftover.is_empty());
    }

    #[test]
    fn cancellation_aborts_and_cleans_up() {
        let seqs: Vec<&[u8]> = vec![b"AAAA", b"ACGT", b"AAAA", b"ACGT"];
        let relation = relation_with(&seqs);
        let dir = tempdir().unwrap();
        let config = AnalysisConfig {
            kmer_size: 4,
            analysis_worker_count: 0,
            ..AnalysisConfig::default()
        };
        let coordinator = Coordinator::new();
        coordinator.cancel();
        let result = run(&relation, &config, dir.path(), &coordinator);
        assert!(matches!(result, Err(KmerError::Cancelled)));

        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftover.is_empty());
    }
}
