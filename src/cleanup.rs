//! Cleanup command (§6): sweeps a temp-tablespace directory for
//! `pg_kmersearch_`-prefixed shard files abandoned by a crashed or
//! cancelled analysis run.
//!
//! One directory per call; a caller enumerating several temp-tablespace
//! directories just loops over them.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::error::{KmerError, KmerResult};

/// Shard file name prefix (§4.6/§6) identifying files this utility may
/// remove.
pub const SHARD_PREFIX: &str = "pg_kmersearch_";

/// Default grace period before an abandoned shard is considered
/// deletable.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(60);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted_count: u64,
    pub deleted_bytes: u64,
    pub error_count: u64,
}

/// Delete every regular file in `dir` named `pg_kmersearch_*` whose mtime
/// is older than `grace`. Per-file stat/remove failures are counted in
/// `error_count` rather than aborting the sweep.
pub fn sweep_temp_tablespace(dir: &Path, grace: Duration) -> KmerResult<CleanupReport> {
    let entries = std::fs::read_dir(dir).map_err(|e| KmerError::io(dir.to_path_buf(), e))?;
    let now = SystemTime::now();
    let mut report = CleanupReport::default();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => {
                report.error_count += 1;
                continue;
            }
        };

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(SHARD_PREFIX) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(_) => {
                report.error_count += 1;
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let age = match metadata.modified().and_then(|mtime| {
            now.duration_since(mtime)
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "mtime in the future"))
        }) {
            Ok(age) => age,
            Err(_) => {
                report.error_count += 1;
                continue;
            }
        };
        if age < grace {
            continue;
        }

        let size = metadata.len();
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                report.deleted_count += 1;
                report.deleted_bytes += size;
                log::info!("cleanup: removed abandoned shard {}", entry.path().display());
            }
            Err(_) => report.error_count += 1,
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn touch(path: &Path, contents: &[u8]) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(contents).unwrap();
    }

    #[test]
    fn leaves_fresh_shards_alone_within_grace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pg_kmersearch_1234_abcd");
        touch(&path, b"data");
        let report = sweep_temp_tablespace(dir.path(), DEFAULT_GRACE).unwrap();
        assert_eq!(report.deleted_count, 0);
        assert!(path.exists());
    }

    #[test]
    fn removes_shards_once_grace_has_elapsed() {
        // A zero grace period means "no file is young enough to spare",
        // exercising the deletion path without needing to fabricate mtimes.
        let dir = tempdir().unwrap();
        let path = dir.path().join("pg_kmersearch_1234_abcd");
        touch(&path, b"data!!!!");

        let report = sweep_temp_tablespace(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.deleted_bytes, 8);
        assert!(!path.exists());
    }

    #[test]
    fn ignores_files_without_the_shard_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unrelated_file");
        touch(&path, b"data");

        let report = sweep_temp_tablespace(dir.path(), Duration::ZERO).unwrap();
        assert_eq!(report.deleted_count, 0);
        assert!(path.exists());
    }
}
