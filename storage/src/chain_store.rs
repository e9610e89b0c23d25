//! Chain store
//!
//! Typed access to the database for the transition life cycle:
//! - executed world states are staged by state root before finalization;
//!   stagings are counted per root and a state is deleted when the last one
//!   is released, unless it is the last finalized state
//! - finalize commits the transaction list, the result bytes and the
//!   last-finalized pointer in one batch
//! - committed blocks (with their vote proofs) are recorded by height

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_types::{FinalizedBlock, Hash, TransactionList};
use tracing::{debug, warn};

use crate::bucket::Bucket;
use crate::database::{Database, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::state::WorldState;

const LAST_FINALIZED_KEY: &[u8] = b"last_finalized";

/// Pointer to the most recently finalized transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastFinalized {
    pub height: i64,
    pub transactions_hash: Hash,
    pub state_root: Hash,
    pub result: Vec<u8>,
}

/// Everything finalize writes for one transition.
#[derive(Debug, Clone)]
pub struct FinalizedRecord {
    pub height: i64,
    pub transactions_hash: Hash,
    pub state_root: Hash,
    pub result: Vec<u8>,
    /// `None` skips persisting the transaction list
    pub transactions: Option<TransactionList>,
    /// `false` skips persisting result bytes (light replay)
    pub persist_result: bool,
}

#[derive(Clone)]
pub struct ChainStore {
    db: Arc<dyn Database>,
    /// Live stagings per state root
    staged: Arc<Mutex<HashMap<Hash, usize>>>,
}

impl ChainStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            staged: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Stage an executed state, returning its root. Each successful call
    /// must be paired with [`release_state`](Self::release_state) unless the
    /// state gets committed.
    pub fn stage_state(&self, state: &WorldState) -> StorageResult<Hash> {
        let bytes = state.to_bytes()?;
        let root = tessera_types::sha3_256(&bytes);
        *self.staged.lock().entry(root).or_insert(0) += 1;
        if let Err(e) = self.db.set(Bucket::WorldStates, &root, &bytes) {
            if let Err(release) = self.release_state(&root) {
                warn!(root = %hex::encode(&root[..8]), error = %release, "Failed to release unwritten state");
            }
            return Err(e);
        }
        debug!(root = %hex::encode(&root[..8]), size = bytes.len(), "Staged world state");
        Ok(root)
    }

    pub fn load_state(&self, root: &Hash) -> StorageResult<Option<WorldState>> {
        match self.db.get(Bucket::WorldStates, root)? {
            Some(bytes) => Ok(Some(WorldState::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Release one staging of `root`. Returns whether the state was deleted.
    pub fn release_state(&self, root: &Hash) -> StorageResult<bool> {
        let mut staged = self.staged.lock();
        match staged.get_mut(root) {
            Some(count) if *count > 1 => {
                *count -= 1;
                return Ok(false);
            }
            Some(_) => {
                staged.remove(root);
            }
            None => return Ok(false),
        }
        if self
            .last_finalized()?
            .is_some_and(|pointer| pointer.state_root == *root)
        {
            return Ok(false);
        }
        self.db.delete(Bucket::WorldStates, root)?;
        debug!(root = %hex::encode(&root[..8]), "Dropped staged world state");
        Ok(true)
    }

    /// Stagings currently held for `root`.
    pub fn staged_count(&self, root: &Hash) -> usize {
        self.staged.lock().get(root).copied().unwrap_or(0)
    }

    pub fn commit(&self, record: &FinalizedRecord) -> StorageResult<()> {
        let mut batch = WriteBatch::new();

        if let Some(transactions) = &record.transactions {
            let bytes = bcs::to_bytes(transactions)?;
            batch.put(Bucket::TransactionLists, transactions.hash().to_vec(), bytes);
        }

        if record.persist_result {
            batch.put(
                Bucket::Results,
                record.height.to_be_bytes().to_vec(),
                record.result.clone(),
            );
        }

        let pointer = LastFinalized {
            height: record.height,
            transactions_hash: record.transactions_hash,
            state_root: record.state_root,
            result: record.result.clone(),
        };
        batch.put(Bucket::Meta, LAST_FINALIZED_KEY.to_vec(), bcs::to_bytes(&pointer)?);

        self.db.write(batch)?;

        // The committed state is now held by the pointer instead of its staging.
        let mut staged = self.staged.lock();
        if let Some(count) = staged.get_mut(&record.state_root) {
            *count -= 1;
            if *count == 0 {
                staged.remove(&record.state_root);
            }
        }
        drop(staged);
        debug!(height = record.height, "Committed finalized transition");
        Ok(())
    }

    pub fn last_finalized(&self) -> StorageResult<Option<LastFinalized>> {
        match self.db.get(Bucket::Meta, LAST_FINALIZED_KEY)? {
            Some(bytes) => Ok(Some(bcs::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// World state of the last finalized transition, if any was finalized.
    pub fn load_finalized_state(&self) -> StorageResult<Option<(LastFinalized, WorldState)>> {
        let Some(pointer) = self.last_finalized()? else {
            return Ok(None);
        };
        let state = self
            .load_state(&pointer.state_root)?
            .ok_or_else(|| StorageError::not_found(Bucket::WorldStates, &pointer.state_root))?;
        Ok(Some((pointer, state)))
    }

    pub fn transactions(&self, hash: &Hash) -> StorageResult<Option<TransactionList>> {
        match self.db.get(Bucket::TransactionLists, hash)? {
            Some(bytes) => Ok(Some(bcs::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn result_at(&self, height: i64) -> StorageResult<Option<Vec<u8>>> {
        self.db.get(Bucket::Results, &height.to_be_bytes())
    }

    pub fn put_block(&self, block: &FinalizedBlock) -> StorageResult<()> {
        let bytes = bcs::to_bytes(block)?;
        self.db
            .set(Bucket::Blocks, &block.header.height.to_be_bytes(), &bytes)
    }

    pub fn block_at(&self, height: i64) -> StorageResult<Option<FinalizedBlock>> {
        match self.db.get(Bucket::Blocks, &height.to_be_bytes())? {
            Some(bytes) => Ok(Some(bcs::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::state::Account;
    use tessera_types::test_utils::{address_of, test_genesis, test_keys};
    use tessera_types::{Address, BlockHeader, Transaction, ValidatorList, U256};

    fn store() -> ChainStore {
        ChainStore::new(Arc::new(MemoryDatabase::new()))
    }

    #[test]
    fn test_stage_and_load() {
        let store = store();
        let keys = test_keys(2);
        let state = WorldState::from_genesis(&test_genesis(&keys, &keys, 7));

        let root = store.stage_state(&state).unwrap();
        assert_eq!(root, state.state_root().unwrap());
        assert_eq!(store.load_state(&root).unwrap(), Some(state));

        assert!(store.release_state(&root).unwrap());
        assert_eq!(store.load_state(&root).unwrap(), None);
    }

    #[test]
    fn test_shared_root_survives_one_release() {
        let store = store();
        let keys = test_keys(2);
        let state = WorldState::from_genesis(&test_genesis(&keys, &keys, 7));

        let root = store.stage_state(&state).unwrap();
        assert_eq!(store.stage_state(&state).unwrap(), root);
        assert_eq!(store.staged_count(&root), 2);

        assert!(!store.release_state(&root).unwrap());
        assert!(store.load_state(&root).unwrap().is_some());
        assert!(store.release_state(&root).unwrap());
        assert!(store.load_state(&root).unwrap().is_none());
        // unknown roots are ignored
        assert!(!store.release_state(&root).unwrap());
    }

    #[test]
    fn test_finalized_root_is_never_released() {
        let store = store();
        let state = WorldState::default();
        let root = store.stage_state(&state).unwrap();
        store
            .commit(&FinalizedRecord {
                height: 1,
                transactions_hash: [0; 32],
                state_root: root,
                result: vec![],
                transactions: None,
                persist_result: false,
            })
            .unwrap();
        assert_eq!(store.staged_count(&root), 0);

        // a later transition reaching the same state, then discarded
        assert_eq!(store.stage_state(&state).unwrap(), root);
        assert!(!store.release_state(&root).unwrap());
        assert!(store.load_finalized_state().unwrap().is_some());
    }

    #[test]
    fn test_failed_stage_holds_nothing() {
        let db = Arc::new(crate::testing::FailingDatabase::new());
        let store = ChainStore::new(db.clone());
        let state = WorldState::default();
        let root = state.state_root().unwrap();

        db.fail_next_writes(1);
        assert!(store.stage_state(&state).unwrap_err().is_retryable());
        assert_eq!(store.staged_count(&root), 0);
    }

    #[test]
    fn test_commit_full() {
        let store = store();
        let keys = test_keys(2);
        let mut state = WorldState::default();
        state.set_account(address_of(&keys[0]), Account { balance: U256::from(5), nonce: 0 });
        let root = store.stage_state(&state).unwrap();

        let tx = Transaction::transfer(&keys[0], address_of(&keys[1]), 1, 0, 1).unwrap();
        let txs = TransactionList::new(vec![tx]);
        store
            .commit(&FinalizedRecord {
                height: 3,
                transactions_hash: txs.hash(),
                state_root: root,
                result: vec![1, 2],
                transactions: Some(txs.clone()),
                persist_result: true,
            })
            .unwrap();

        let pointer = store.last_finalized().unwrap().unwrap();
        assert_eq!(pointer.height, 3);
        assert_eq!(pointer.state_root, root);
        assert_eq!(store.result_at(3).unwrap(), Some(vec![1, 2]));
        assert_eq!(store.transactions(&txs.hash()).unwrap(), Some(txs));

        let (_, loaded) = store.load_finalized_state().unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_commit_light_replay_skips_result() {
        let store = store();
        let state = WorldState::default();
        let root = store.stage_state(&state).unwrap();

        store
            .commit(&FinalizedRecord {
                height: 1,
                transactions_hash: [1; 32],
                state_root: root,
                result: vec![7],
                transactions: None,
                persist_result: false,
            })
            .unwrap();

        assert_eq!(store.result_at(1).unwrap(), None);
        assert_eq!(store.last_finalized().unwrap().unwrap().result, vec![7]);

        store.database().delete(Bucket::WorldStates, &root).unwrap();
        assert!(matches!(
            store.load_finalized_state(),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_fresh_store_has_nothing_finalized() {
        let store = store();
        assert_eq!(store.last_finalized().unwrap(), None);
        assert!(store.load_finalized_state().unwrap().is_none());
    }

    #[test]
    fn test_blocks_by_height() {
        let store = store();
        let block = FinalizedBlock {
            header: BlockHeader {
                height: 4,
                round: 1,
                parent_id: None,
                timestamp: 0,
                proposer: Address::new([1; 20]),
                transactions_hash: [0; 32],
                result: vec![],
                next_validators: ValidatorList::default(),
            },
            votes: vec![3, 4],
        };
        store.put_block(&block).unwrap();
        assert_eq!(store.block_at(4).unwrap(), Some(block));
        assert_eq!(store.block_at(5).unwrap(), None);
    }
}
