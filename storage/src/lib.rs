//! Tessera storage
//!
//! ## Structure
//! - `database`: the key-value contract (`Database`) and write batches
//! - `memory`: DashMap backed in-memory database
//! - `state`: world state snapshots (accounts and validators)
//! - `chain_store`: staged results, finalized transitions and blocks

pub mod bucket;
pub mod chain_store;
pub mod database;
pub mod error;
pub mod memory;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bucket::Bucket;
pub use chain_store::{ChainStore, FinalizedRecord, LastFinalized};
pub use database::{Database, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDatabase;
pub use state::{Account, WorldState};
