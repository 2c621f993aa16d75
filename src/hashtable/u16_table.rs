//! Direct-addressed u16 hash table (magic `KMR1`): a flat array of
//! 65,536 `u64` counters, one per possible 16-bit key. `add`/`get` are
//! single-offset reads and writes; no chaining, no collisions.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{KmerError, KmerResult};

const MAGIC: &[u8; 4] = b"KMR1";
const VERSION: u16 = 1;
const KEY_TYPE: u16 = 16;
const HEADER_LEN: usize = 32;
const SLOT_COUNT: usize = 65_536;
const TABLE_LEN: usize = HEADER_LEN + SLOT_COUNT * 8;

/// Header layout (32 B, little-endian): magic(4) version(2) key_type(2)
/// entry_count(8) reserved(12) checksum(4).
const ENTRY_COUNT_OFFSET: usize = 8;
const CHECKSUM_OFFSET: usize = 28;

pub struct U16Table {
    mmap: MmapMut,
    file: std::fs::File,
    path: PathBuf,
}

impl U16Table {
    /// Create a fresh, zeroed shard at `path`.
    pub fn create(path: impl AsRef<Path>) -> KmerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| KmerError::io(path.clone(), e))?;
        file.set_len(TABLE_LEN as u64)
            .map_err(|e| KmerError::io(path.clone(), e))?;
        let mut mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| KmerError::io(path.clone(), e))? };

        mmap[0..4].copy_from_slice(MAGIC);
        mmap[4..6].copy_from_slice(&VERSION.to_le_bytes());
        mmap[6..8].copy_from_slice(&KEY_TYPE.to_le_bytes());
        mmap[8..16].copy_from_slice(&0u64.to_le_bytes());

        Ok(Self { mmap, file, path })
    }

    /// Open and validate an existing shard.
    pub fn open(path: impl AsRef<Path>) -> KmerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| KmerError::io(path.clone(), e))?;
        let len = file
            .metadata()
            .map_err(|e| KmerError::io(path.clone(), e))?
            .len();
        if len != TABLE_LEN as u64 {
            return Err(KmerError::corrupt(
                path,
                format!("expected {TABLE_LEN} bytes, file is {len}"),
            ));
        }
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| KmerError::io(path.clone(), e))? };
        let table = Self { mmap, file, path };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> KmerResult<()> {
        if &self.mmap[0..4] != MAGIC {
            return Err(KmerError::corrupt(self.path.clone(), "bad magic"));
        }
        let version = u16::from_le_bytes(self.mmap[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(KmerError::corrupt(
                self.path.clone(),
                format!("unsupported version {version}"),
            ));
        }
        let stored_checksum = u32::from_le_bytes(
            self.mmap[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4]
                .try_into()
                .unwrap(),
        );
        if stored_checksum != 0 && stored_checksum != self.compute_checksum() {
            return Err(KmerError::corrupt(self.path.clone(), "checksum mismatch"));
        }
        Ok(())
    }

    fn compute_checksum(&self) -> u32 {
        let mut acc: u32 = 0x9e3779b9;
        for (key, value) in self.iterate() {
            acc = acc
                .wrapping_add(crate::hashtable::murmur3_32(key as u32))
                .wrapping_add(value as u32);
        }
        acc
    }

    /// Stamp the header checksum. Call before handing a shard off to a
    /// different worker/merge step; `open` validates it.
    pub fn finalize(&mut self) {
        let checksum = self.compute_checksum();
        self.mmap[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
    }

    fn slot_offset(key: u16) -> usize {
        HEADER_LEN + 8 * key as usize
    }

    pub fn add(&mut self, key: u16, delta: u64) {
        let offset = Self::slot_offset(key);
        let current = u64::from_le_bytes(self.mmap[offset..offset + 8].try_into().unwrap());
        if current == 0 && delta > 0 {
            let count = u64::from_le_bytes(
                self.mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8]
                    .try_into()
                    .unwrap(),
            );
            self.mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8]
                .copy_from_slice(&(count + 1).to_le_bytes());
        }
        let updated = current.wrapping_add(delta);
        self.mmap[offset..offset + 8].copy_from_slice(&updated.to_le_bytes());
    }

    /// Batch-add path used by the scan worker's flush step.
    pub fn add_many(&mut self, deltas: impl IntoIterator<Item = (u16, u64)>) {
        for (key, delta) in deltas {
            self.add(key, delta);
        }
    }

    pub fn get(&self, key: u16) -> u64 {
        let offset = Self::slot_offset(key);
        u64::from_le_bytes(self.mmap[offset..offset + 8].try_into().unwrap())
    }

    pub fn entry_count(&self) -> u64 {
        u64::from_le_bytes(
            self.mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8]
                .try_into()
                .unwrap(),
        )
    }

    /// All (key, value) pairs with a non-zero counter.
    pub fn iterate(&self) -> Vec<(u16, u64)> {
        (0..SLOT_COUNT as u16)
            .filter_map(|key| {
                let value = self.get(key);
                (value > 0).then_some((key, value))
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Merge `src` into `dst` (summing counters), then unlink `src`'s file.
pub fn merge(dst: &mut U16Table, src: U16Table) -> KmerResult<()> {
    for (key, value) in src.iterate() {
        dst.add(key, value);
    }
    let src_path = src.path.clone();
    drop(src);
    std::fs::remove_file(&src_path).map_err(|e| KmerError::io(src_path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_get_round_trip() {
        let dir = tempdir().unwrap();
        let mut table = U16Table::create(dir.path().join("a.kmr1")).unwrap();
        table.add(42, 3);
        table.add(42, 4);
        assert_eq!(table.get(42), 7);
        assert_eq!(table.entry_count(), 1);
    }

    #[test]
    fn iterate_skips_zero_slots() {
        let dir = tempdir().unwrap();
        let mut table = U16Table::create(dir.path().join("a.kmr1")).unwrap();
        table.add(1, 5);
        table.add(2, 1);
        let entries = table.iterate();
        assert_eq!(entries, vec![(1, 5), (2, 1)]);
    }

    #[test]
    fn open_validates_checksum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.kmr1");
        let mut table = U16Table::create(&path).unwrap();
        table.add(10, 1);
        table.finalize();
        drop(table);

        let reopened = U16Table::open(&path).unwrap();
        assert_eq!(reopened.get(10), 1);
    }

    #[test]
    fn open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.kmr1");
        std::fs::write(&path, vec![0u8; TABLE_LEN]).unwrap();
        assert!(U16Table::open(&path).is_err());
    }

    #[test]
    fn merge_sums_counters_and_unlinks_source() {
        let dir = tempdir().unwrap();
        let mut dst = U16Table::create(dir.path().join("dst.kmr1")).unwrap();
        let mut src = U16Table::create(dir.path().join("src.kmr1")).unwrap();
        dst.add(1, 1);
        src.add(1, 2);
        src.add(2, 5);
        let src_path = src.path().to_path_buf();
        merge(&mut dst, src).unwrap();
        assert_eq!(dst.get(1), 3);
        assert_eq!(dst.get(2), 5);
        assert!(!src_path.exists());
    }
}
