//! In-memory database
//!
//! Uses DashMap for lock-free concurrent reads. Suitable for tests and nodes
//! running without persistence.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::bucket::Bucket;
use crate::database::{Database, WriteBatch, WriteOp};
use crate::error::StorageResult;

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    entries: DashMap<(Bucket, Vec<u8>), Vec<u8>>,
    /// Serializes batches so two batches never interleave
    write_lock: Mutex<()>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored in `bucket`.
    pub fn count(&self, bucket: Bucket) -> usize {
        self.entries.iter().filter(|e| e.key().0 == bucket).count()
    }
}

impl Database for MemoryDatabase {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(bucket, key.to_vec()))
            .map(|v| v.value().clone()))
    }

    fn set(&self, bucket: Bucket, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        self.entries.insert((bucket, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: Bucket, key: &[u8]) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        self.entries.remove(&(bucket, key.to_vec()));
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { bucket, key, value } => {
                    self.entries.insert((bucket, key), value);
                }
                WriteOp::Delete { bucket, key } => {
                    self.entries.remove(&(bucket, key));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_separate() {
        let db = MemoryDatabase::new();
        db.set(Bucket::Meta, b"k", b"meta").unwrap();
        db.set(Bucket::Results, b"k", b"result").unwrap();

        assert_eq!(db.get(Bucket::Meta, b"k").unwrap(), Some(b"meta".to_vec()));
        assert_eq!(db.get(Bucket::Results, b"k").unwrap(), Some(b"result".to_vec()));
        assert_eq!(db.get(Bucket::Blocks, b"k").unwrap(), None);

        db.delete(Bucket::Meta, b"k").unwrap();
        assert!(!db.contains(Bucket::Meta, b"k").unwrap());
        assert!(db.contains(Bucket::Results, b"k").unwrap());
    }

    #[test]
    fn test_batch_write() {
        let db = MemoryDatabase::new();
        db.set(Bucket::Blocks, b"old", b"x").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Bucket::Blocks, b"a".to_vec(), b"1".to_vec());
        batch.put(Bucket::Blocks, b"b".to_vec(), b"2".to_vec());
        batch.delete(Bucket::Blocks, b"old".to_vec());
        assert_eq!(batch.len(), 3);
        db.write(batch).unwrap();

        assert_eq!(db.count(Bucket::Blocks), 2);
        assert_eq!(db.get(Bucket::Blocks, b"b").unwrap(), Some(b"2".to_vec()));
    }
}
