//! Crate-wide error type
//!
//! Every fallible operation in this crate returns [`KmerResult`]. The
//! variants mirror the error kinds enumerated in the design: bad input is
//! rejected synchronously, I/O and shard corruption abort the run via the
//! coordinator, and cancellation is not itself an error to the caller.

use std::path::PathBuf;

/// Errors produced by codec, extractor, hash table, analysis, and cache
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum KmerError {
    /// Bad ASCII base, k outside [4, 32], mismatched alphabet, zero-bit
    /// DNA4 code, or a bit length not divisible by the alphabet's width.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single DNA4 window's degenerate expansion exceeded the
    /// configured ceiling and was skipped (non-fatal).
    #[error("k-mer window expansion exceeded ceiling ({0} > {1}), window skipped")]
    CapacityExceeded(usize, u32),

    /// Shard open/read/write/unlink failure.
    #[error("shard I/O failure at {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bad magic, version, or checksum on shard open.
    #[error("corrupt shard at {path}: {reason}")]
    CorruptShard { path: PathBuf, reason: String },

    /// e.g. preclude enabled without the shared cache in a parallel build.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// Cooperative cancellation aborted the run.
    #[error("analysis cancelled")]
    Cancelled,
}

impl KmerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KmerError::IoFailure {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        KmerError::CorruptShard {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for all fallible operations in this crate.
pub type KmerResult<T> = Result<T, KmerError>;
