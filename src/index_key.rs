//! Index Key Extractor (§4.8): turns a row's bit-packed column into the
//! deduplicated, saturating-occurrence inverted-index keys ("ngram
//! keys") consumed by the host database's index.

use std::collections::BTreeMap;

use crate::cache::HighFrequencyCache;
use crate::config::IndexBuildConfig;
use crate::error::{KmerError, KmerResult};
use crate::kmer::extractor::{extract_dna2_kmers, extract_dna4_kmers_expanded, KmerArray};
use crate::sequence::{BitPackedSequence, SequenceAlphabet};

/// Extract every k-mer in `seq`, drop high-frequency ones (unless
/// `config.preclude_highfreq_kmer` is false), and bit-pack the survivors
/// into ngram keys: `(kmer_integer << occurrence_bitlen) | ordinal`,
/// one key per occurrence up to `2^occurrence_bitlen` per distinct
/// k-mer.
pub fn extract_index_keys(
    seq: &BitPackedSequence,
    alphabet: SequenceAlphabet,
    config: &IndexBuildConfig,
    cache: Option<&HighFrequencyCache>,
) -> KmerResult<Vec<u64>> {
    config.validate()?;

    if config.preclude_highfreq_kmer && cache.is_none() {
        return Err(KmerError::ConfigConflict(
            "preclude_highfreq_kmer is set but no cache was supplied".to_string(),
        ));
    }

    let kmers: KmerArray = match alphabet {
        SequenceAlphabet::Dna2 => extract_dna2_kmers(seq, config.kmer_size)?.0,
        SequenceAlphabet::Dna4 => {
            let (array, _count, skipped) =
                extract_dna4_kmers_expanded(seq, config.kmer_size, config.max_window_expansions)?;
            if skipped > 0 {
                log::debug!("index key extraction skipped {skipped} over-expansion windows");
            }
            array
        }
    };

    let mut counts: BTreeMap<u64, u32> = BTreeMap::new();
    for kmer in kmers.iter_u64() {
        if config.preclude_highfreq_kmer && cache.unwrap().contains(kmer) {
            continue;
        }
        *counts.entry(kmer).or_insert(0) += 1;
    }

    // 2^occurrence_bitlen distinct ordinals fit before saturating.
    let max_entries_per_kmer: u32 = 1 << config.occurrence_bitlen;
    let mut keys = Vec::new();
    for (kmer, count) in counts {
        let emitted = count.min(max_entries_per_kmer);
        for ordinal in 0..emitted {
            keys.push((kmer << config.occurrence_bitlen) | ordinal as u64);
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_dna2;

    fn config(k: usize, occurrence_bitlen: u8, preclude: bool) -> IndexBuildConfig {
        IndexBuildConfig {
            kmer_size: k,
            occurrence_bitlen,
            preclude_highfreq_kmer: preclude,
            force_use_parallel_highfreq_kmer_cache: false,
            max_window_expansions: crate::kmer::DEFAULT_MAX_WINDOW_EXPANSIONS,
            parallel_build: false,
        }
    }

    #[test]
    fn no_preclude_emits_every_kmer_once() {
        let seq = encode_dna2(b"ACGTAC").unwrap();
        let cfg = config(3, 0, false);
        let keys = extract_index_keys(&seq, SequenceAlphabet::Dna2, &cfg, None).unwrap();
        // base_count=6, k=3 -> 4 windows, all distinct except wrap-around duplicates.
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn preclude_without_cache_is_config_conflict() {
        let seq = encode_dna2(b"ACGTAC").unwrap();
        let cfg = config(3, 0, true);
        let err = extract_index_keys(&seq, SequenceAlphabet::Dna2, &cfg, None).unwrap_err();
        assert!(matches!(err, KmerError::ConfigConflict(_)));
    }

    #[test]
    fn cached_kmer_is_filtered_out() {
        // "ACGT" k=4 -> single k-mer, value 0x1B.
        let seq = encode_dna2(b"ACGT").unwrap();
        let cfg = config(4, 0, true);
        let cache = HighFrequencyCache::ProcessLocal(std::sync::Arc::new(
            crate::cache::ProcessLocalCache::from_keys([0x1B]),
        ));
        let keys = extract_index_keys(&seq, SequenceAlphabet::Dna2, &cfg, Some(&cache)).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn saturating_occurrence_matches_scenario_5() {
        // Row with kmers {X, Y, Y}; X is cached (filtered); occurrence_bitlen=2
        // so Y's two occurrences get ordinals {0, 1}.
        let seq = encode_dna2(b"AAAAA").unwrap(); // k=4: AAAA appears twice (positions 0,1)
        let cfg = config(4, 2, true);
        let cache = HighFrequencyCache::ProcessLocal(std::sync::Arc::new(
            crate::cache::ProcessLocalCache::from_keys([]),
        ));
        let keys = extract_index_keys(&seq, SequenceAlphabet::Dna2, &cfg, Some(&cache)).unwrap();
        let kmer = 0u64; // AAAA -> 0
        assert_eq!(keys, vec![(kmer << 2) | 0, (kmer << 2) | 1]);
    }

    #[test]
    fn occurrence_saturates_at_cap() {
        // All-A sequence of length 8, k=4: 5 windows, all kmer=0.
        // occurrence_bitlen=1 -> cap of 2 entries (ordinals 0,1).
        let seq = encode_dna2(b"AAAAAAAA").unwrap();
        let cfg = config(4, 1, false);
        let keys = extract_index_keys(&seq, SequenceAlphabet::Dna2, &cfg, None).unwrap();
        assert_eq!(keys, vec![0, 1]);
    }
}
