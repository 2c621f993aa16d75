//! K-mer indexing and similarity search core for DNA sequences stored as
//! bit-packed values.
//!
//! This crate implements the storage-engine-agnostic parts of a k-mer
//! search index: an alphabet codec (DNA2/DNA4), a bit-packed sequence
//! container, a k-mer extractor with SIMD-accelerated classification, a
//! file-backed hash table family, a high-frequency analysis engine, an
//! index-key extractor, and the cache/config/cleanup surfaces around
//! them. Embedding a real host database means implementing
//! [`relation::RelationSource`] against its heap-scan API; everything
//! else here is self-contained.

pub mod analysis;
pub mod cache;
pub mod cleanup;
pub mod codec;
pub mod config;
pub mod error;
pub mod hashtable;
pub mod index_key;
pub mod kmer;
pub mod relation;
pub mod sequence;

pub use analysis::{Coordinator, HighFrequencyEntry, HighFrequencySet};
pub use cache::{HighFrequencyCache, ProcessLocalCache, SharedCache};
pub use codec::{decode_dna2, decode_dna4, encode_dna2, encode_dna4};
pub use config::{recommended_worker_count, AnalysisConfig, IndexBuildConfig};
pub use error::{KmerError, KmerResult};
pub use index_key::extract_index_keys;
pub use kmer::extractor::{extract_dna2_kmers, extract_dna4_kmers_expanded, KmerArray};
pub use kmer::KmerWidth;
pub use relation::{InMemoryRelation, RelationSource};
pub use sequence::{BitPackedSequence, SequenceAlphabet};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
