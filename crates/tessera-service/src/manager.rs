//! Service manager
//!
//! Owns the transition table and the finalized-parent pointer. Transitions
//! live in an arena keyed by id and indexed by height; children refer to
//! their parent by id. Finalizing a transition removes every other entry at
//! or below its height, together with descendants of removed entries.

use std::collections::{BTreeMap, HashMap};
use std::ops::BitOr;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_storage::{ChainStore, Database, FinalizedRecord, WorldState};
use tessera_types::{ConsensusConfig, GenesisConfig, Transaction, TransactionList};
use tracing::{debug, info, warn, Span};

use crate::error::{LifecycleError, PoolError, TransitionError, TransitionResult};
use crate::pool::TransactionPool;
use crate::transition::{
    Outcome, Transition, TransitionId, TransitionOrigin, TransitionParts, TransitionState,
};

/// What [`ServiceManager::finalize`] persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinalizeFlags(u8);

impl FinalizeFlags {
    pub const NONE: FinalizeFlags = FinalizeFlags(0);
    /// Persist the transaction list
    pub const NORMAL_TRANSACTIONS: FinalizeFlags = FinalizeFlags(0b01);
    /// Persist the result bytes
    pub const RESULT: FinalizeFlags = FinalizeFlags(0b10);
    pub const ALL: FinalizeFlags = FinalizeFlags(0b11);

    pub fn contains(&self, other: FinalizeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flags matching the persistence toggles of `config`.
    pub fn from_config(config: &ConsensusConfig) -> Self {
        let mut flags = FinalizeFlags::NONE;
        if config.persist_transactions {
            flags = flags | FinalizeFlags::NORMAL_TRANSACTIONS;
        }
        if config.persist_result {
            flags = flags | FinalizeFlags::RESULT;
        }
        flags
    }
}

impl BitOr for FinalizeFlags {
    type Output = FinalizeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        FinalizeFlags(self.0 | rhs.0)
    }
}

#[derive(Default)]
struct Table {
    next_id: u64,
    transitions: HashMap<TransitionId, Transition>,
    by_height: BTreeMap<i64, Vec<TransitionId>>,
    finalized: Option<TransitionId>,
}

impl Table {
    fn allocate_id(&mut self) -> TransitionId {
        self.next_id += 1;
        TransitionId::new(self.next_id)
    }

    fn insert(&mut self, transition: Transition) {
        self.by_height
            .entry(transition.height())
            .or_default()
            .push(transition.id());
        self.transitions.insert(transition.id(), transition);
    }

    fn finalized(&self) -> Option<&Transition> {
        self.finalized.and_then(|id| self.transitions.get(&id))
    }
}

pub struct ServiceManager {
    store: ChainStore,
    pool: TransactionPool,
    config: ConsensusConfig,
    span: Span,
    table: Mutex<Table>,
}

impl ServiceManager {
    /// `span` scopes every event this manager and its transitions log.
    pub fn new(db: Arc<dyn Database>, config: ConsensusConfig, span: Span) -> Self {
        Self {
            store: ChainStore::new(db),
            pool: TransactionPool::new(config.tx_pool_capacity),
            config,
            span,
            table: Mutex::new(Table::default()),
        }
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Verify and queue a transaction for future proposals.
    pub fn send_transaction(&self, tx: Transaction) -> Result<(), PoolError> {
        let _enter = self.span.enter();
        let hash = tx.hash();
        match self.pool.add(tx) {
            Ok(()) => {
                debug!(tx = %hex::encode(&hash[..8]), pending = self.pool.len(), "Transaction queued");
                Ok(())
            }
            Err(e) => {
                debug!(tx = %hex::encode(&hash[..8]), error = %e, "Transaction rejected");
                Err(e)
            }
        }
    }

    /// Bootstrap transition over the persisted state: the last finalized
    /// height, or height 0 with an empty state for a fresh database. Returned
    /// already finalized. Calling it again returns the current finalized
    /// transition.
    pub fn create_initial_transition(&self) -> TransitionResult<Transition> {
        let _enter = self.span.enter();
        let mut table = self.table.lock();
        if let Some(finalized) = table.finalized() {
            return Ok(finalized.clone());
        }

        let (height, outcome) = match self.store.load_finalized_state()? {
            Some((pointer, state)) => (
                pointer.height,
                Outcome::restored(state, pointer.state_root, pointer.result),
            ),
            None => {
                let state = WorldState::default();
                let root = state.state_root()?;
                (0, Outcome::executed(state, root, Vec::new()))
            }
        };

        let id = table.allocate_id();
        let parent_state = Arc::clone(&outcome.state);
        let transition = Transition::finalized(
            TransitionParts {
                id,
                height,
                parent_id: None,
                origin: TransitionOrigin::Initial,
                transactions: TransactionList::default(),
                parent_state,
                store: self.store.clone(),
                span: self.span.clone(),
            },
            outcome,
        );
        table.insert(transition.clone());
        table.finalized = Some(id);

        info!(transition = %id, height, "Created initial transition");
        Ok(transition)
    }

    /// Height-1 transition applying `genesis`, ready to execute.
    pub fn propose_genesis_transition(
        &self,
        initial: &Transition,
        genesis: GenesisConfig,
    ) -> TransitionResult<Transition> {
        let _enter = self.span.enter();
        if !matches!(initial.origin(), TransitionOrigin::Initial) || initial.height() != 0 {
            return Err(LifecycleError::NotInitial(initial.id()).into());
        }
        genesis.validate().map_err(TransitionError::Validation)?;

        let mut table = self.table.lock();
        Self::check_can_propose(&table, initial)?;

        let parent_state = initial
            .world_state()
            .ok_or(LifecycleError::ParentNotExecuted { parent: initial.id() })?;
        let id = table.allocate_id();
        let transition = Transition::new(
            TransitionParts {
                id,
                height: 1,
                parent_id: Some(initial.id()),
                origin: TransitionOrigin::Genesis(genesis),
                transactions: TransactionList::default(),
                parent_state,
                store: self.store.clone(),
                span: self.span.clone(),
            },
            TransitionState::Validated,
        );
        table.insert(transition.clone());

        info!(transition = %id, "Proposed genesis transition");
        Ok(transition)
    }

    /// New transition on top of the finalized `parent`, filled from the pool.
    pub fn propose_transition(&self, parent: &Transition) -> TransitionResult<Transition> {
        let _enter = self.span.enter();
        let mut table = self.table.lock();
        Self::check_can_propose(&table, parent)?;

        let parent_state = parent
            .world_state()
            .ok_or(LifecycleError::ParentNotExecuted { parent: parent.id() })?;
        let transactions = TransactionList::new(
            self.pool
                .candidates(self.config.max_txs_per_block, &parent_state),
        );

        let id = table.allocate_id();
        let height = parent.height() + 1;
        let txs = transactions.len();
        // Pool entries were verified on admission.
        let transition = Transition::new(
            TransitionParts {
                id,
                height,
                parent_id: Some(parent.id()),
                origin: TransitionOrigin::Proposed,
                transactions,
                parent_state,
                store: self.store.clone(),
                span: self.span.clone(),
            },
            TransitionState::Validated,
        );
        table.insert(transition.clone());

        info!(transition = %id, height, txs, "Proposed transition");
        Ok(transition)
    }

    /// Transition replaying a transaction list received from a proposer.
    pub fn create_transition(
        &self,
        parent: &Transition,
        transactions: TransactionList,
    ) -> TransitionResult<Transition> {
        let _enter = self.span.enter();
        let mut table = self.table.lock();
        if !table.transitions.contains_key(&parent.id()) {
            return Err(LifecycleError::UnknownTransition(parent.id()).into());
        }
        let parent_state = match parent.state() {
            TransitionState::Executed | TransitionState::Finalized => parent
                .world_state()
                .ok_or(LifecycleError::ParentNotExecuted { parent: parent.id() })?,
            _ => return Err(LifecycleError::ParentNotExecuted { parent: parent.id() }.into()),
        };

        let id = table.allocate_id();
        let height = parent.height() + 1;
        let txs = transactions.len();
        let transition = Transition::new(
            TransitionParts {
                id,
                height,
                parent_id: Some(parent.id()),
                origin: TransitionOrigin::Replayed,
                transactions,
                parent_state,
                store: self.store.clone(),
                span: self.span.clone(),
            },
            TransitionState::Created,
        );
        table.insert(transition.clone());

        debug!(transition = %id, height, txs, "Created replay transition");
        Ok(transition)
    }

    /// Commit an executed transition whose parent is the finalized one.
    ///
    /// Exactly one transition per height can succeed; the others fail with
    /// `HeightAlreadyFinalized` and leave the finalized pointer untouched.
    pub fn finalize(&self, transition: &Transition, flags: FinalizeFlags) -> TransitionResult<()> {
        let _enter = self.span.enter();
        let mut table = self.table.lock();

        let finalized = table.finalized().cloned().ok_or(LifecycleError::NothingFinalized)?;
        if transition.height() <= finalized.height() {
            return Err(LifecycleError::HeightAlreadyFinalized {
                height: transition.height(),
            }
            .into());
        }
        match transition.state() {
            TransitionState::Executed => {}
            TransitionState::Discarded => return Err(TransitionError::Discarded),
            actual => {
                return Err(LifecycleError::InvalidState {
                    id: transition.id(),
                    expected: "Executed",
                    actual,
                }
                .into())
            }
        }
        if transition.parent_id() != Some(finalized.id()) {
            return Err(LifecycleError::ParentNotFinalized {
                parent: transition.parent_id().unwrap_or(finalized.id()),
            }
            .into());
        }

        let (Some(state_root), Some(result)) = (transition.state_root(), transition.result())
        else {
            return Err(LifecycleError::InvalidState {
                id: transition.id(),
                expected: "Executed",
                actual: transition.state(),
            }
            .into());
        };

        let record = FinalizedRecord {
            height: transition.height(),
            transactions_hash: transition.transactions().hash(),
            state_root,
            result,
            transactions: flags
                .contains(FinalizeFlags::NORMAL_TRANSACTIONS)
                .then(|| transition.transactions().clone()),
            persist_result: flags.contains(FinalizeFlags::RESULT),
        };
        self.store.commit(&record)?;

        if !transition.mark_finalized() {
            // Executed transitions are only discarded by prune, under the table lock.
            warn!(transition = %transition.id(), "Transition changed state during finalize");
            return Err(TransitionError::Discarded);
        }
        table.finalized = Some(transition.id());
        self.prune(&mut table, transition);
        self.pool.remove_committed(transition.transactions());
        let stale = transition
            .world_state()
            .map_or(0, |state| self.pool.remove_stale(&state));

        info!(
            transition = %transition.id(),
            height = transition.height(),
            txs = transition.transactions().len(),
            stale_txs = stale,
            persist_txs = flags.contains(FinalizeFlags::NORMAL_TRANSACTIONS),
            persist_result = flags.contains(FinalizeFlags::RESULT),
            "Finalized transition"
        );
        Ok(())
    }

    pub fn finalized(&self) -> Option<Transition> {
        self.table.lock().finalized().cloned()
    }

    pub fn transition(&self, id: TransitionId) -> Option<Transition> {
        self.table.lock().transitions.get(&id).cloned()
    }

    /// Number of transitions tracked, the finalized one included.
    pub fn tracked(&self) -> usize {
        self.table.lock().transitions.len()
    }

    fn check_can_propose(table: &Table, parent: &Transition) -> TransitionResult<()> {
        if table.finalized != Some(parent.id()) {
            return Err(LifecycleError::ParentNotFinalized { parent: parent.id() }.into());
        }
        let height = parent.height() + 1;
        let busy = table
            .by_height
            .get(&height)
            .into_iter()
            .flatten()
            .filter_map(|id| table.transitions.get(id))
            .any(|t| {
                matches!(
                    t.origin(),
                    TransitionOrigin::Proposed | TransitionOrigin::Genesis(_)
                ) && t.state().is_in_flight()
            });
        if busy {
            return Err(LifecycleError::ProposalInProgress { height }.into());
        }
        Ok(())
    }

    /// Drop everything at or below the winner's height except the winner,
    /// then every transition whose parent is no longer tracked.
    fn prune(&self, table: &mut Table, winner: &Transition) {
        let mut removed = Vec::new();

        let heights: Vec<i64> = table
            .by_height
            .range(..=winner.height())
            .map(|(h, _)| *h)
            .collect();
        for height in heights {
            if let Some(ids) = table.by_height.remove(&height) {
                for id in ids {
                    if id == winner.id() {
                        continue;
                    }
                    if let Some(t) = table.transitions.remove(&id) {
                        removed.push(t);
                    }
                }
            }
        }
        table.by_height.insert(winner.height(), vec![winner.id()]);

        let later: Vec<i64> = table
            .by_height
            .range(winner.height() + 1..)
            .map(|(h, _)| *h)
            .collect();
        for height in later {
            let ids = table.by_height.remove(&height).unwrap_or_default();
            let mut kept = Vec::with_capacity(ids.len());
            for id in ids {
                let orphan = table
                    .transitions
                    .get(&id)
                    .and_then(|t| t.parent_id())
                    .map_or(true, |p| !table.transitions.contains_key(&p));
                if orphan {
                    if let Some(t) = table.transitions.remove(&id) {
                        removed.push(t);
                    }
                } else {
                    kept.push(id);
                }
            }
            if !kept.is_empty() {
                table.by_height.insert(height, kept);
            }
        }

        for t in removed {
            // Earlier finalized transitions leave the table but stay finalized.
            if t.state() == TransitionState::Finalized {
                continue;
            }
            t.discard();
            // A transition still executing releases its own staging.
            if let Some(root) = t.state_root() {
                if let Err(e) = self.store.release_state(&root) {
                    warn!(transition = %t.id(), error = %e, "Failed to release staged state");
                }
            }
            debug!(transition = %t.id(), height = t.height(), "Discarded transition");
        }
    }
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("tracked", &self.tracked())
            .field("pending_txs", &self.pool.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::ChannelCallback;
    use crate::executor::receipts_root;
    use tessera_storage::MemoryDatabase;
    use tessera_types::test_utils::{address_of, test_genesis, test_keys};
    use tessera_types::U256;

    fn manager() -> ServiceManager {
        ServiceManager::new(
            Arc::new(MemoryDatabase::new()),
            ConsensusConfig::default(),
            Span::none(),
        )
    }

    async fn run(transition: &Transition) -> TransitionResult<()> {
        let (callback, waiter) = ChannelCallback::new();
        transition.execute(callback)?;
        waiter.wait().await
    }

    #[test]
    fn test_flags() {
        let all = FinalizeFlags::NORMAL_TRANSACTIONS | FinalizeFlags::RESULT;
        assert_eq!(all, FinalizeFlags::ALL);
        assert!(all.contains(FinalizeFlags::RESULT));
        assert!(!FinalizeFlags::NORMAL_TRANSACTIONS.contains(FinalizeFlags::RESULT));

        let light = ConsensusConfig {
            persist_result: false,
            ..ConsensusConfig::default()
        };
        assert_eq!(
            FinalizeFlags::from_config(&light),
            FinalizeFlags::NORMAL_TRANSACTIONS
        );
    }

    #[test]
    fn test_initial_transition_is_idempotent() {
        let manager = manager();
        let a = manager.create_initial_transition().unwrap();
        let b = manager.create_initial_transition().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.height(), 0);
        assert_eq!(a.state(), TransitionState::Finalized);
        assert!(a.result().is_some());
    }

    #[tokio::test]
    async fn test_genesis_only_on_initial() {
        let manager = manager();
        let keys = test_keys(2);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 10))
            .unwrap();
        run(&genesis).await.unwrap();
        manager.finalize(&genesis, FinalizeFlags::ALL).unwrap();

        let err = manager
            .propose_genesis_transition(&genesis, test_genesis(&keys, &keys, 10))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Lifecycle(LifecycleError::NotInitial(genesis.id()))
        );
    }

    #[tokio::test]
    async fn test_propose_requires_finalized_parent() {
        let manager = manager();
        let keys = test_keys(2);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 10))
            .unwrap();

        let err = manager.propose_transition(&genesis).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Lifecycle(LifecycleError::ParentNotFinalized { .. })
        ));
    }

    #[tokio::test]
    async fn test_finalize_before_execute_fails() {
        let manager = manager();
        let keys = test_keys(2);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 10))
            .unwrap();

        let err = manager.finalize(&genesis, FinalizeFlags::ALL).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Lifecycle(LifecycleError::InvalidState { .. })
        ));
        assert_eq!(manager.finalized().unwrap(), initial);
    }

    #[tokio::test]
    async fn test_execute_twice_fails() {
        let manager = manager();
        let keys = test_keys(2);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 10))
            .unwrap();
        run(&genesis).await.unwrap();

        let err = run(&genesis).await.unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Lifecycle(LifecycleError::InvalidState {
                actual: TransitionState::Executed,
                ..
            })
        ));
    }

    #[test]
    fn test_execute_without_runtime() {
        let manager = manager();
        let keys = test_keys(1);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 10))
            .unwrap();
        let (callback, _waiter) = ChannelCallback::new();
        assert_eq!(genesis.execute(callback), Err(TransitionError::NoRuntime));
        assert_eq!(genesis.state(), TransitionState::Validated);
    }

    #[tokio::test]
    async fn test_send_transaction_feeds_proposal() {
        let manager = manager();
        let keys = test_keys(2);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 100))
            .unwrap();
        run(&genesis).await.unwrap();
        manager.finalize(&genesis, FinalizeFlags::ALL).unwrap();

        let tx = Transaction::transfer(&keys[0], address_of(&keys[1]), 5, 0, 1).unwrap();
        manager.send_transaction(tx.clone()).unwrap();
        assert_eq!(manager.send_transaction(tx), Err(PoolError::Duplicate));

        let proposal = manager.propose_transition(&genesis).unwrap();
        assert_eq!(proposal.transactions().len(), 1);
        run(&proposal).await.unwrap();
        manager.finalize(&proposal, FinalizeFlags::ALL).unwrap();

        assert!(manager.pool().is_empty());
        let state = manager.finalized().unwrap().world_state().unwrap();
        assert_eq!(state.balance(&address_of(&keys[1])), U256::from(105));
    }

    #[tokio::test]
    async fn test_finalize_evicts_used_nonces() {
        let manager = manager();
        let keys = test_keys(2);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 100))
            .unwrap();
        run(&genesis).await.unwrap();
        manager.finalize(&genesis, FinalizeFlags::ALL).unwrap();

        let queued = Transaction::transfer(&keys[0], address_of(&keys[1]), 5, 0, 1).unwrap();
        manager.send_transaction(queued).unwrap();

        // another proposer spent nonce 0 on a different transfer
        let other = Transaction::transfer(&keys[0], address_of(&keys[1]), 7, 0, 2).unwrap();
        let replay = manager
            .create_transition(&genesis, TransactionList::new(vec![other]))
            .unwrap();
        run(&replay).await.unwrap();
        manager.finalize(&replay, FinalizeFlags::ALL).unwrap();

        assert!(manager.pool().is_empty());
    }

    #[tokio::test]
    async fn test_result_matches_receipts_root() {
        let manager = manager();
        let keys = test_keys(1);
        let initial = manager.create_initial_transition().unwrap();
        let genesis = manager
            .propose_genesis_transition(&initial, test_genesis(&keys, &keys, 1))
            .unwrap();
        run(&genesis).await.unwrap();

        let result = genesis.result().unwrap();
        assert_eq!(&result[..32], &genesis.state_root().unwrap());
        assert_eq!(&result[32..], &receipts_root(&[]));
    }
}
