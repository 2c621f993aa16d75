//! Configuration surface for analysis and index-build entry points.
//!
//! The teacher threads configuration through an `ExecutionConfig`
//! struct passed to each engine call rather than global state; this
//! crate follows the same shape, one struct per top-level entry point,
//! validated once at construction.

use serde::{Deserialize, Serialize};

use crate::error::{KmerError, KmerResult};
use crate::kmer::{validate_k, DEFAULT_MAX_WINDOW_EXPANSIONS};

/// Configuration for a high-frequency analysis run (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub kmer_size: usize,
    pub occurrence_bitlen: u8,
    pub highfreq_max_rate: f64,
    pub highfreq_max_nrow: u64,
    pub highfreq_analysis_batch_size: usize,
    pub highfreq_analysis_hashtable_size: u64,
    pub analysis_worker_count: usize,
    pub max_window_expansions: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            kmer_size: 16,
            occurrence_bitlen: 0,
            highfreq_max_rate: 0.01,
            highfreq_max_nrow: u64::MAX,
            highfreq_analysis_batch_size: 100_000,
            highfreq_analysis_hashtable_size: 1_000_000,
            analysis_worker_count: 0,
            max_window_expansions: DEFAULT_MAX_WINDOW_EXPANSIONS,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> KmerResult<()> {
        validate_k(self.kmer_size)?;
        if self.occurrence_bitlen > 8 {
            return Err(KmerError::InvalidInput(format!(
                "occurrence_bitlen {} outside [0, 8]",
                self.occurrence_bitlen
            )));
        }
        if !(self.highfreq_max_rate > 0.0 && self.highfreq_max_rate <= 1.0) {
            return Err(KmerError::InvalidInput(format!(
                "highfreq_max_rate {} outside (0, 1]",
                self.highfreq_max_rate
            )));
        }
        if self.highfreq_analysis_batch_size == 0 {
            return Err(KmerError::InvalidInput(
                "highfreq_analysis_batch_size must be positive".to_string(),
            ));
        }
        if self.highfreq_analysis_hashtable_size == 0 {
            return Err(KmerError::InvalidInput(
                "highfreq_analysis_hashtable_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// `threshold = min(max_nrow, ceil(total_rows * max_rate))`.
    pub fn threshold(&self, total_rows: u64) -> u64 {
        let by_rate = (total_rows as f64 * self.highfreq_max_rate).ceil() as u64;
        by_rate.min(self.highfreq_max_nrow)
    }

    /// The worker count this run will actually use. `0` is a deliberate
    /// request for coordinator-only (inline) execution, not "unset" —
    /// callers who want CPU-sized parallelism should populate
    /// `analysis_worker_count` from [`recommended_worker_count`] before
    /// constructing the config, rather than rely on a 0 defaulting here.
    pub fn effective_worker_count(&self) -> usize {
        self.analysis_worker_count
    }
}

/// Suggested `analysis_worker_count`/parallel-build worker count for
/// callers that want to scale to the host's CPUs rather than pick a
/// literal number or request inline (0) execution.
pub fn recommended_worker_count() -> usize {
    num_cpus::get()
}

/// Configuration for an index build (§4.7/§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBuildConfig {
    pub kmer_size: usize,
    pub occurrence_bitlen: u8,
    pub preclude_highfreq_kmer: bool,
    pub force_use_parallel_highfreq_kmer_cache: bool,
    pub max_window_expansions: u32,
    /// Whether this build runs with multiple concurrent index-build
    /// workers (drives the preclude/parallel-cache conflict check).
    pub parallel_build: bool,
}

impl Default for IndexBuildConfig {
    fn default() -> Self {
        Self {
            kmer_size: 16,
            occurrence_bitlen: 0,
            preclude_highfreq_kmer: true,
            force_use_parallel_highfreq_kmer_cache: false,
            max_window_expansions: DEFAULT_MAX_WINDOW_EXPANSIONS,
            parallel_build: false,
        }
    }
}

impl IndexBuildConfig {
    pub fn validate(&self) -> KmerResult<()> {
        validate_k(self.kmer_size)?;
        if self.occurrence_bitlen > 8 {
            return Err(KmerError::InvalidInput(format!(
                "occurrence_bitlen {} outside [0, 8]",
                self.occurrence_bitlen
            )));
        }
        if self.parallel_build
            && self.preclude_highfreq_kmer
            && !self.force_use_parallel_highfreq_kmer_cache
        {
            return Err(KmerError::ConfigConflict(
                "preclude_highfreq_kmer requires force_use_parallel_highfreq_kmer_cache in a parallel build"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Total bits in an emitted ngram key: `2k + occurrence_bitlen`.
    pub fn ngram_key_bits(&self) -> usize {
        2 * self.kmer_size + self.occurrence_bitlen as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configs_validate() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(IndexBuildConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_k_out_of_range() {
        let mut config = AnalysisConfig::default();
        config.kmer_size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_occurrence_bitlen_out_of_range() {
        let mut config = AnalysisConfig::default();
        config.occurrence_bitlen = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_preclude_without_parallel_cache() {
        let config = IndexBuildConfig {
            parallel_build: true,
            preclude_highfreq_kmer: true,
            force_use_parallel_highfreq_kmer_cache: false,
            ..IndexBuildConfig::default()
        };
        assert!(matches!(config.validate(), Err(KmerError::ConfigConflict(_))));
    }

    #[test]
    fn threshold_uses_rate_and_caps_at_max_nrow() {
        let config = AnalysisConfig {
            highfreq_max_rate: 0.5,
            highfreq_max_nrow: 10,
            ..AnalysisConfig::default()
        };
        assert_eq!(config.threshold(100), 10); // 50 capped to 10
        assert_eq!(config.threshold(10), 5);
    }

    #[test]
    fn recommended_worker_count_is_positive() {
        assert!(recommended_worker_count() > 0);
    }
}
