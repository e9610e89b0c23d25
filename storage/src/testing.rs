//! Database wrappers for exercising failure paths

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::bucket::Bucket;
use crate::database::{Database, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::memory::MemoryDatabase;

/// In-memory database whose next writes can be made to fail with a
/// retryable I/O error.
#[derive(Debug, Default)]
pub struct FailingDatabase {
    inner: MemoryDatabase,
    failures: AtomicUsize,
}

impl FailingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes (`set`, `delete` or `write`).
    pub fn fail_next_writes(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    fn check(&self, bucket: Bucket) -> StorageResult<()> {
        let tripped = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StorageError::Io {
                bucket,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Database for FailingDatabase {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(bucket, key)
    }

    fn set(&self, bucket: Bucket, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.check(bucket)?;
        self.inner.set(bucket, key, value)
    }

    fn delete(&self, bucket: Bucket, key: &[u8]) -> StorageResult<()> {
        self.check(bucket)?;
        self.inner.delete(bucket, key)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        self.check(Bucket::Meta)?;
        self.inner.write(batch)
    }
}

#[derive(Debug, Default)]
struct Gate {
    armed: Option<Bucket>,
    held: bool,
    open: bool,
}

/// In-memory database that can park the next `set` to a bucket until
/// released, pinning the writer mid-operation.
#[derive(Debug, Default)]
pub struct GatedDatabase {
    inner: MemoryDatabase,
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl GatedDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryDatabase {
        &self.inner
    }

    /// Park the next `set` to `bucket` until [`release`](Self::release).
    pub fn hold_next_write(&self, bucket: Bucket) {
        let mut gate = self.gate.lock();
        *gate = Gate {
            armed: Some(bucket),
            held: false,
            open: false,
        };
    }

    /// Block until a writer is parked.
    pub fn wait_until_held(&self) {
        let mut gate = self.gate.lock();
        while !gate.held {
            self.changed.wait(&mut gate);
        }
    }

    pub fn release(&self) {
        self.gate.lock().open = true;
        self.changed.notify_all();
    }

    fn pass(&self, bucket: Bucket) {
        let mut gate = self.gate.lock();
        if gate.armed != Some(bucket) {
            return;
        }
        gate.armed = None;
        gate.held = true;
        self.changed.notify_all();
        while !gate.open {
            self.changed.wait(&mut gate);
        }
        gate.held = false;
    }
}

impl Database for GatedDatabase {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(bucket, key)
    }

    fn set(&self, bucket: Bucket, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.pass(bucket);
        self.inner.set(bucket, key, value)
    }

    fn delete(&self, bucket: Bucket, key: &[u8]) -> StorageResult<()> {
        self.inner.delete(bucket, key)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        self.inner.write(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fails_exactly_n_writes() {
        let db = FailingDatabase::new();
        db.fail_next_writes(2);

        let err = db.set(Bucket::Meta, b"a", b"1").unwrap_err();
        assert!(err.is_retryable());
        assert!(db.set(Bucket::Meta, b"a", b"1").is_err());
        assert!(db.set(Bucket::Meta, b"a", b"1").is_ok());
        assert_eq!(db.get(Bucket::Meta, b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_gate_parks_one_write() {
        let db = std::sync::Arc::new(GatedDatabase::new());
        db.hold_next_write(Bucket::Results);
        db.set(Bucket::Meta, b"a", b"1").unwrap();

        let writer = {
            let db = db.clone();
            std::thread::spawn(move || db.set(Bucket::Results, b"b", b"2"))
        };
        db.wait_until_held();
        assert_eq!(db.get(Bucket::Results, b"b").unwrap(), None);

        db.release();
        writer.join().unwrap().unwrap();
        assert_eq!(db.inner().count(Bucket::Results), 1);
        // the gate fires once
        db.set(Bucket::Results, b"c", b"3").unwrap();
    }
}
