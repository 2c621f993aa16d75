//! Chained hash table variants for u32/u64 keys (magics `KMR2`/`KMR3`).
//!
//! Bucket directory of `bucket_count` (power of two) head offsets,
//! followed by a bump-allocated entry region. Offsets are 1-based so 0
//! can mean "no entry" for both bucket heads and `next` pointers.

use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use super::{murmur3_32, murmur3_64};
use crate::error::{KmerError, KmerResult};

const HEADER_LEN: usize = 64;
const VERSION: u16 = 1;
const BUCKET_COUNT_OFFSET: usize = 8;
const ENTRY_COUNT_OFFSET: usize = 16;
const NEXT_ENTRY_OFFSET_OFFSET: usize = 24;
const CHECKSUM_OFFSET: usize = 60;

const MIN_BUCKET_COUNT: u64 = 4096;
const MAX_BUCKET_COUNT: u64 = 16_777_216;

/// A key width the chained table can be keyed on.
pub trait ChainKey: Copy + Eq + std::fmt::Debug {
    const MAGIC: &'static [u8; 4];
    const KEY_TYPE: u16;
    const BYTE_LEN: usize;

    fn to_le_bytes_vec(self) -> Vec<u8>;
    fn from_le_bytes(bytes: &[u8]) -> Self;
    fn bucket_hash(self) -> u64;
    fn as_u64(self) -> u64;
}

impl ChainKey for u32 {
    const MAGIC: &'static [u8; 4] = b"KMR2";
    const KEY_TYPE: u16 = 32;
    const BYTE_LEN: usize = 4;

    fn to_le_bytes_vec(self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
    fn from_le_bytes(bytes: &[u8]) -> Self {
        u32::from_le_bytes(bytes.try_into().unwrap())
    }
    fn bucket_hash(self) -> u64 {
        murmur3_32(self) as u64
    }
    fn as_u64(self) -> u64 {
        self as u64
    }
}

impl ChainKey for u64 {
    const MAGIC: &'static [u8; 4] = b"KMR3";
    const KEY_TYPE: u16 = 64;
    const BYTE_LEN: usize = 8;

    fn to_le_bytes_vec(self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
    fn from_le_bytes(bytes: &[u8]) -> Self {
        u64::from_le_bytes(bytes.try_into().unwrap())
    }
    fn bucket_hash(self) -> u64 {
        murmur3_64(self)
    }
    fn as_u64(self) -> u64 {
        self
    }
}

fn entry_len<K: ChainKey>() -> usize {
    K::BYTE_LEN + 8 + 8 // key + value + next
}

fn next_pow2(n: u64) -> u64 {
    n.next_power_of_two()
}

/// `clamp(hint/4, 4096, 16_777_216)` rounded up to the next power of two.
fn bucket_count_for_hint(hint: u64) -> u64 {
    next_pow2((hint / 4).clamp(MIN_BUCKET_COUNT, MAX_BUCKET_COUNT))
}

pub struct ChainedTable<K: ChainKey> {
    mmap: MmapMut,
    file: std::fs::File,
    path: PathBuf,
    bucket_count: u64,
    entry_region_capacity: u64,
    _key: PhantomData<K>,
}

impl<K: ChainKey> ChainedTable<K> {
    fn bucket_dir_offset() -> usize {
        HEADER_LEN
    }

    fn entry_region_offset(bucket_count: u64) -> usize {
        HEADER_LEN + bucket_count as usize * 8
    }

    fn file_len(bucket_count: u64, entry_capacity: u64) -> u64 {
        Self::entry_region_offset(bucket_count) as u64 + entry_capacity * entry_len::<K>() as u64
    }

    /// Create a fresh shard sized from `row_count_hint` distinct keys
    /// expected, targeting load factor <= 0.25 at the hint.
    pub fn create(path: impl AsRef<Path>, row_count_hint: u64) -> KmerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let bucket_count = bucket_count_for_hint(row_count_hint.max(1));
        let entry_capacity = row_count_hint.max(1024);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| KmerError::io(path.clone(), e))?;
        file.set_len(Self::file_len(bucket_count, entry_capacity))
            .map_err(|e| KmerError::io(path.clone(), e))?;
        let mut mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| KmerError::io(path.clone(), e))? };

        mmap[0..4].copy_from_slice(K::MAGIC);
        mmap[4..6].copy_from_slice(&VERSION.to_le_bytes());
        mmap[6..8].copy_from_slice(&K::KEY_TYPE.to_le_bytes());
        mmap[BUCKET_COUNT_OFFSET..BUCKET_COUNT_OFFSET + 8]
            .copy_from_slice(&bucket_count.to_le_bytes());
        mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8].copy_from_slice(&0u64.to_le_bytes());
        mmap[NEXT_ENTRY_OFFSET_OFFSET..NEXT_ENTRY_OFFSET_OFFSET + 8]
            .copy_from_slice(&0u64.to_le_bytes());

        Ok(Self {
            mmap,
            file,
            path,
            bucket_count,
            entry_region_capacity: entry_capacity,
            _key: PhantomData,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> KmerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| KmerError::io(path.clone(), e))?;
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| KmerError::io(path.clone(), e))? };

        if mmap.len() < HEADER_LEN {
            return Err(KmerError::corrupt(path, "file shorter than header"));
        }
        if &mmap[0..4] != K::MAGIC {
            return Err(KmerError::corrupt(path, "bad magic"));
        }
        let version = u16::from_le_bytes(mmap[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(KmerError::corrupt(path, format!("unsupported version {version}")));
        }
        let bucket_count =
            u64::from_le_bytes(mmap[BUCKET_COUNT_OFFSET..BUCKET_COUNT_OFFSET + 8].try_into().unwrap());
        let entry_region_bytes = mmap.len() - Self::entry_region_offset(bucket_count);
        let entry_region_capacity = entry_region_bytes as u64 / entry_len::<K>() as u64;

        let table = Self {
            mmap,
            file,
            path,
            bucket_count,
            entry_region_capacity,
            _key: PhantomData,
        };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> KmerResult<()> {
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
        let mut acc: u32 = 0x9e3779b9 ^ self.bucket_count as u32;
        for (key, value) in self.iterate() {
            acc = acc.wrapping_add(murmur3_32(key as u32)).wrapping_add(value as u32);
        }
        acc
    }

    pub fn finalize(&mut self) {
        let checksum = self.compute_checksum();
        self.mmap[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
    }

    fn bucket_head(&self, bucket: u64) -> u64 {
        let offset = Self::bucket_dir_offset() + bucket as usize * 8;
        u64::from_le_bytes(self.mmap[offset..offset + 8].try_into().unwrap())
    }

    fn set_bucket_head(&mut self, bucket: u64, ptr: u64) {
        let offset = Self::bucket_dir_offset() + bucket as usize * 8;
        self.mmap[offset..offset + 8].copy_from_slice(&ptr.to_le_bytes());
    }

    fn entry_byte_offset(&self, ptr: u64) -> usize {
        Self::entry_region_offset(self.bucket_count) + (ptr - 1) as usize * entry_len::<K>()
    }

    fn read_entry(&self, ptr: u64) -> (K, u64, u64) {
        let off = self.entry_byte_offset(ptr);
        let key = K::from_le_bytes(&self.mmap[off..off + K::BYTE_LEN]);
        let value_off = off + K::BYTE_LEN;
        let value = u64::from_le_bytes(self.mmap[value_off..value_off + 8].try_into().unwrap());
        let next_off = value_off + 8;
        let next = u64::from_le_bytes(self.mmap[next_off..next_off + 8].try_into().unwrap());
        (key, value, next)
    }

    fn write_entry(&mut self, ptr: u64, key: K, value: u64, next: u64) {
        let off = self.entry_byte_offset(ptr);
        let key_bytes = key.to_le_bytes_vec();
        self.mmap[off..off + K::BYTE_LEN].copy_from_slice(&key_bytes);
        let value_off = off + K::BYTE_LEN;
        self.mmap[value_off..value_off + 8].copy_from_slice(&value.to_le_bytes());
        let next_off = value_off + 8;
        self.mmap[next_off..next_off + 8].copy_from_slice(&next.to_le_bytes());
    }

    fn next_entry_offset(&self) -> u64 {
        u64::from_le_bytes(
            self.mmap[NEXT_ENTRY_OFFSET_OFFSET..NEXT_ENTRY_OFFSET_OFFSET + 8]
                .try_into()
                .unwrap(),
        )
    }

    fn set_next_entry_offset(&mut self, v: u64) {
        self.mmap[NEXT_ENTRY_OFFSET_OFFSET..NEXT_ENTRY_OFFSET_OFFSET + 8]
            .copy_from_slice(&v.to_le_bytes());
    }

    fn set_entry_count(&mut self, v: u64) {
        self.mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8].copy_from_slice(&v.to_le_bytes());
    }

    pub fn entry_count(&self) -> u64 {
        u64::from_le_bytes(
            self.mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8]
                .try_into()
                .unwrap(),
        )
    }

    fn grow_if_needed(&mut self) -> KmerResult<()> {
        if self.next_entry_offset() < self.entry_region_capacity {
            return Ok(());
        }
        let new_capacity = (self.entry_region_capacity * 2).max(1024);
        let new_len = Self::file_len(self.bucket_count, new_capacity);
        self.file
            .set_len(new_len)
            .map_err(|e| KmerError::io(self.path.clone(), e))?;
        self.mmap =
            unsafe { MmapMut::map_mut(&self.file).map_err(|e| KmerError::io(self.path.clone(), e))? };
        self.entry_region_capacity = new_capacity;
        Ok(())
    }

    pub fn add(&mut self, key: K, delta: u64) -> KmerResult<()> {
        let bucket = key.bucket_hash() & (self.bucket_count - 1);
        let mut ptr = self.bucket_head(bucket);
        while ptr != 0 {
            let (entry_key, value, next) = self.read_entry(ptr);
            if entry_key == key {
                self.write_entry(ptr, key, value.wrapping_add(delta), next);
                return Ok(());
            }
            ptr = next;
        }

        self.grow_if_needed()?;
        let new_ptr = self.next_entry_offset() + 1;
        let old_head = self.bucket_head(bucket);
        self.write_entry(new_ptr, key, delta, old_head);
        self.set_bucket_head(bucket, new_ptr);
        self.set_next_entry_offset(new_ptr);
        self.set_entry_count(self.entry_count() + 1);
        Ok(())
    }

    pub fn get(&self, key: K) -> u64 {
        let bucket = key.bucket_hash() & (self.bucket_count - 1);
        let mut ptr = self.bucket_head(bucket);
        while ptr != 0 {
            let (entry_key, value, next) = self.read_entry(ptr);
            if entry_key == key {
                return value;
            }
            ptr = next;
        }
        0
    }

    /// All (key, value) pairs across every bucket chain.
    pub fn iterate(&self) -> Vec<(K, u64)> {
        let mut out = Vec::with_capacity(self.entry_count() as usize);
        for bucket in 0..self.bucket_count {
            let mut ptr = self.bucket_head(bucket);
            while ptr != 0 {
                let (key, value, next) = self.read_entry(ptr);
                out.push((key, value));
                ptr = next;
            }
        }
        out
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }
}

/// Merge `src` into `dst` (summing counters), then unlink `src`'s file.
pub fn merge<K: ChainKey>(dst: &mut ChainedTable<K>, src: ChainedTable<K>) -> KmerResult<()> {
    for (key, value) in src.iterate() {
        dst.add(key, value)?;
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
    fn add_get_round_trip_u32() {
        let dir = tempdir().unwrap();
        let mut table: ChainedTable<u32> = ChainedTable::create(dir.path().join("a.kmr2"), 1000).unwrap();
        table.add(7, 3).unwrap();
        table.add(7, 4).unwrap();
        table.add(8, 1).unwrap();
        assert_eq!(table.get(7), 7);
        assert_eq!(table.get(8), 1);
        assert_eq!(table.get(9), 0);
        assert_eq!(table.entry_count(), 2);
    }

    #[test]
    fn add_get_round_trip_u64() {
        let dir = tempdir().unwrap();
        let mut table: ChainedTable<u64> = ChainedTable::create(dir.path().join("a.kmr3"), 1000).unwrap();
        table.add(u64::MAX, 5).unwrap();
        assert_eq!(table.get(u64::MAX), 5);
    }

    #[test]
    fn grows_entry_region_past_initial_capacity() {
        let dir = tempdir().unwrap();
        let mut table: ChainedTable<u32> = ChainedTable::create(dir.path().join("a.kmr2"), 4).unwrap();
        for k in 0..5000u32 {
            table.add(k, 1).unwrap();
        }
        assert_eq!(table.entry_count(), 5000);
        for k in 0..5000u32 {
            assert_eq!(table.get(k), 1);
        }
    }

    #[test]
    fn checksum_round_trips_through_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.kmr2");
        let mut table: ChainedTable<u32> = ChainedTable::create(&path, 100).unwrap();
        table.add(1, 9).unwrap();
        table.finalize();
        drop(table);
        let reopened: ChainedTable<u32> = ChainedTable::open(&path).unwrap();
        assert_eq!(reopened.get(1), 9);
    }

    #[test]
    fn open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.kmr2");
        std::fs::write(&path, vec![0u8; HEADER_LEN + 4096 * 8 + 1024 * 20]).unwrap();
        let result: KmerResult<ChainedTable<u32>> = ChainedTable::open(&path);
        assert!(result.is_err());
    }

    #[test]
    fn merge_sums_counters_and_unlinks_source() {
        let dir = tempdir().unwrap();
        let mut dst: ChainedTable<u32> = ChainedTable::create(dir.path().join("dst.kmr2"), 100).unwrap();
        let mut src: ChainedTable<u32> = ChainedTable::create(dir.path().join("src.kmr2"), 100).unwrap();
        dst.add(1, 1).unwrap();
        src.add(1, 2).unwrap();
        src.add(2, 5).unwrap();
        let src_path = src.path().to_path_buf();
        merge(&mut dst, src).unwrap();
        assert_eq!(dst.get(1), 3);
        assert_eq!(dst.get(2), 5);
        assert!(!src_path.exists());
    }
}
