//! Key-value database contract

use crate::bucket::Bucket;
use crate::error::StorageResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        bucket: Bucket,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        bucket: Bucket,
        key: Vec<u8>,
    },
}

/// Writes applied together by [`Database::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, bucket: Bucket, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            bucket,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, bucket: Bucket, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Delete {
            bucket,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Storage backend used by the chain store.
///
/// Implementations must be shareable across threads; execution stages state
/// from Tokio's blocking pool while consensus reads from async tasks.
pub trait Database: Send + Sync {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    fn set(&self, bucket: Bucket, key: &[u8], value: &[u8]) -> StorageResult<()>;

    fn delete(&self, bucket: Bucket, key: &[u8]) -> StorageResult<()>;

    /// Apply every operation of `batch` or none of them.
    fn write(&self, batch: WriteBatch) -> StorageResult<()>;

    fn contains(&self, bucket: Bucket, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(bucket, key)?.is_some())
    }
}
