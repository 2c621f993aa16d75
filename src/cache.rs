//! High-Frequency Cache (§4.7): the in-memory set consulted by the
//! index-key extractor to filter out high-frequency k-mers.
//!
//! Two flavors, both over `u64` regardless of k so there's one code
//! path; callers mask to the relevant width. `ProcessLocalCache` serves
//! a serial build. `SharedCache` is the in-process analogue of the
//! spec's shared-memory variant: one initializing writer, any number of
//! concurrent readers taking the lock only for the lookup itself.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// Process-local high-frequency cache for a serial index build.
#[derive(Debug, Default)]
pub struct ProcessLocalCache {
    keys: HashSet<u64>,
}

impl ProcessLocalCache {
    pub fn from_keys(keys: impl IntoIterator<Item = u64>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn contains(&self, kmer: u64) -> bool {
        self.keys.contains(&kmer)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Shared high-frequency cache for a parallel index build: populated
/// once at build init, then read concurrently by every build worker.
#[derive(Debug, Clone)]
pub struct SharedCache {
    keys: Arc<RwLock<HashSet<u64>>>,
}

impl SharedCache {
    pub fn from_keys(keys: impl IntoIterator<Item = u64>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(keys.into_iter().collect())),
        }
    }

    pub fn contains(&self, kmer: u64) -> bool {
        self.keys.read().contains(&kmer)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

/// Either cache flavor, dispatched on at the index-key extractor's call
/// site per `config::IndexBuildConfig::parallel_build`.
#[derive(Debug, Clone)]
pub enum HighFrequencyCache {
    ProcessLocal(Arc<ProcessLocalCache>),
    Shared(SharedCache),
}

impl HighFrequencyCache {
    pub fn contains(&self, kmer: u64) -> bool {
        match self {
            HighFrequencyCache::ProcessLocal(cache) => cache.contains(kmer),
            HighFrequencyCache::Shared(cache) => cache.contains(kmer),
        }
    }
}
