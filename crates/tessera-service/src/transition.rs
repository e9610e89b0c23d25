//! Transitions
//!
//! A transition turns its parent's world state into a new one by applying a
//! transaction list (or, at height 1, the genesis document).
//!
//! ```text
//! Created ──► Validating ──► Validated ──► Executing ──► Executed ──► Finalized
//!    │             │              │             │            │
//!    └─────────────┴──────────────┴─────────────┴────────────┴──► Discarded
//! ```
//!
//! Transitions are cheap handles; the [`ServiceManager`](crate::ServiceManager)
//! owns the table they live in and refers to parents by id only.
//!
//! Replayed transitions start in `Created` and pass through `Validated` before
//! executing; proposed and genesis transitions start in `Validated`. A
//! transition discarded while executing drops its result and never leaves a
//! staged state behind.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tessera_storage::{ChainStore, WorldState};
use tessera_types::{
    GenesisConfig, Hash, TesseraError, TesseraResult, TransactionList, ValidatorList,
};
use tracing::{debug, info, warn, Span};

use crate::callback::TransitionCallback;
use crate::error::{LifecycleError, TransitionError, TransitionResult};
use crate::executor::{receipts_root, ExecutionOutput, Receipt, TransferExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(u64);

impl TransitionId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Created,
    Validating,
    Validated,
    Executing,
    Executed,
    Finalized,
    Discarded,
}

impl TransitionState {
    /// A result is available.
    pub fn is_executed(&self) -> bool {
        matches!(self, TransitionState::Executed | TransitionState::Finalized)
    }

    /// Validation or execution is running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TransitionState::Validating | TransitionState::Executing)
    }
}

#[derive(Debug, Clone)]
pub enum TransitionOrigin {
    /// Bootstrap transition built from persisted state
    Initial,
    Genesis(GenesisConfig),
    /// Built locally from the transaction pool
    Proposed,
    /// Built from a transaction list received through consensus
    Replayed,
}

impl TransitionOrigin {
    pub fn name(&self) -> &'static str {
        match self {
            TransitionOrigin::Initial => "initial",
            TransitionOrigin::Genesis(_) => "genesis",
            TransitionOrigin::Proposed => "proposed",
            TransitionOrigin::Replayed => "replayed",
        }
    }
}

#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) state: Arc<WorldState>,
    pub(crate) state_root: Hash,
    pub(crate) receipts: Vec<Receipt>,
    pub(crate) result: Vec<u8>,
}

impl Outcome {
    /// Result bytes are the state root followed by the receipts root.
    pub(crate) fn executed(state: WorldState, state_root: Hash, receipts: Vec<Receipt>) -> Self {
        let result = [state_root, receipts_root(&receipts)].concat();
        Self {
            state: Arc::new(state),
            state_root,
            receipts,
            result,
        }
    }

    pub(crate) fn restored(state: WorldState, state_root: Hash, result: Vec<u8>) -> Self {
        Self {
            state: Arc::new(state),
            state_root,
            receipts: Vec::new(),
            result,
        }
    }
}

struct Inner {
    id: TransitionId,
    height: i64,
    parent_id: Option<TransitionId>,
    origin: TransitionOrigin,
    transactions: TransactionList,
    parent_state: Arc<WorldState>,
    store: ChainStore,
    span: Span,
    state: Mutex<TransitionState>,
    /// Set once `execute` has been accepted
    started: AtomicBool,
    outcome: OnceLock<Outcome>,
}

#[derive(Clone)]
pub struct Transition {
    inner: Arc<Inner>,
}

/// Fields shared by every new transition.
pub(crate) struct TransitionParts {
    pub(crate) id: TransitionId,
    pub(crate) height: i64,
    pub(crate) parent_id: Option<TransitionId>,
    pub(crate) origin: TransitionOrigin,
    pub(crate) transactions: TransactionList,
    pub(crate) parent_state: Arc<WorldState>,
    pub(crate) store: ChainStore,
    pub(crate) span: Span,
}

impl Transition {
    pub(crate) fn new(parts: TransitionParts, state: TransitionState) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: parts.id,
                height: parts.height,
                parent_id: parts.parent_id,
                origin: parts.origin,
                transactions: parts.transactions,
                parent_state: parts.parent_state,
                store: parts.store,
                span: parts.span,
                state: Mutex::new(state),
                started: AtomicBool::new(false),
                outcome: OnceLock::new(),
            }),
        }
    }

    /// An already finalized transition wrapping restored state.
    pub(crate) fn finalized(parts: TransitionParts, outcome: Outcome) -> Self {
        let transition = Self::new(parts, TransitionState::Finalized);
        let _ = transition.inner.outcome.set(outcome);
        transition
    }

    pub fn id(&self) -> TransitionId {
        self.inner.id
    }

    pub fn height(&self) -> i64 {
        self.inner.height
    }

    pub fn parent_id(&self) -> Option<TransitionId> {
        self.inner.parent_id
    }

    pub fn origin(&self) -> &TransitionOrigin {
        &self.inner.origin
    }

    pub fn transactions(&self) -> &TransactionList {
        &self.inner.transactions
    }

    pub fn state(&self) -> TransitionState {
        *self.inner.state.lock()
    }

    /// State root followed by receipts root; `None` before execution.
    pub fn result(&self) -> Option<Vec<u8>> {
        self.inner.outcome.get().map(|o| o.result.clone())
    }

    pub fn state_root(&self) -> Option<Hash> {
        self.inner.outcome.get().map(|o| o.state_root)
    }

    pub fn receipts(&self) -> Option<&[Receipt]> {
        self.inner.outcome.get().map(|o| o.receipts.as_slice())
    }

    pub fn world_state(&self) -> Option<Arc<WorldState>> {
        self.inner.outcome.get().map(|o| Arc::clone(&o.state))
    }

    /// Validators effective after this transition.
    pub fn next_validators(&self) -> Option<ValidatorList> {
        self.inner.outcome.get().map(|o| o.state.validators().clone())
    }

    /// Start validation (from `Created`) or execution (from `Validated`) on
    /// the Tokio blocking pool. Outcomes are reported through `callback`.
    pub fn execute(&self, callback: Arc<dyn TransitionCallback>) -> TransitionResult<()> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| TransitionError::NoRuntime)?;

        let needs_validation = {
            let mut state = self.inner.state.lock();
            match *state {
                TransitionState::Created => {
                    *state = TransitionState::Validating;
                    self.inner.started.store(true, Ordering::SeqCst);
                    true
                }
                TransitionState::Validated if !self.inner.started.swap(true, Ordering::SeqCst) => {
                    *state = TransitionState::Executing;
                    false
                }
                actual => {
                    return Err(LifecycleError::InvalidState {
                        id: self.inner.id,
                        expected: "Created or Validated",
                        actual,
                    }
                    .into())
                }
            }
        };

        let transition = self.clone();
        handle.spawn_blocking(move || transition.run(callback.as_ref(), needs_validation));
        Ok(())
    }

    fn run(&self, callback: &dyn TransitionCallback, needs_validation: bool) {
        let _enter = self.inner.span.enter();

        if needs_validation {
            if let Err(e) = self.validate() {
                warn!(transition = %self.inner.id, height = self.inner.height, error = %e, "Transition failed validation");
                self.discard();
                callback.on_validate(self, Err(TransitionError::Validation(e)));
                return;
            }
            if !self.advance(TransitionState::Validating, TransitionState::Validated) {
                callback.on_validate(self, Err(TransitionError::Discarded));
                return;
            }
        }
        callback.on_validate(self, Ok(()));
        if needs_validation && !self.advance(TransitionState::Validated, TransitionState::Executing) {
            callback.on_execute(self, Err(TransitionError::Discarded));
            return;
        }

        let output = match &self.inner.origin {
            TransitionOrigin::Genesis(genesis) => ExecutionOutput {
                state: WorldState::from_genesis(genesis),
                receipts: Vec::new(),
            },
            _ => TransferExecutor::new().execute(&self.inner.parent_state, &self.inner.transactions),
        };

        if self.state() != TransitionState::Executing {
            debug!(transition = %self.inner.id, "Transition discarded during execution, result dropped");
            callback.on_execute(self, Err(TransitionError::Discarded));
            return;
        }
        let state_root = match self.inner.store.stage_state(&output.state) {
            Ok(root) => root,
            Err(e) => {
                warn!(transition = %self.inner.id, error = %e, retryable = e.is_retryable(), "Failed to stage transition result");
                self.discard();
                callback.on_execute(self, Err(TransitionError::Storage(e)));
                return;
            }
        };
        let outcome = Outcome::executed(output.state, state_root, output.receipts);

        {
            let mut state = self.inner.state.lock();
            if *state != TransitionState::Executing {
                drop(state);
                // Nobody saw the outcome, so the staging is still ours.
                if let Err(e) = self.inner.store.release_state(&state_root) {
                    warn!(transition = %self.inner.id, error = %e, "Failed to release staged state");
                }
                debug!(transition = %self.inner.id, "Transition discarded during execution, result dropped");
                callback.on_execute(self, Err(TransitionError::Discarded));
                return;
            }
            let _ = self.inner.outcome.set(outcome);
            *state = TransitionState::Executed;
        }

        info!(
            transition = %self.inner.id,
            height = self.inner.height,
            origin = self.inner.origin.name(),
            txs = self.inner.transactions.len(),
            state_root = %hex::encode(&state_root[..8]),
            "Transition executed"
        );
        callback.on_execute(self, Ok(()));
    }

    fn validate(&self) -> TesseraResult<()> {
        if let TransitionOrigin::Genesis(genesis) = &self.inner.origin {
            genesis.validate()?;
        }
        let mut seen = HashSet::with_capacity(self.inner.transactions.len());
        for tx in self.inner.transactions.iter() {
            tx.validate()?;
            if !seen.insert(tx.hash()) {
                return Err(TesseraError::InvalidTransaction(format!(
                    "duplicate transaction {}",
                    hex::encode(tx.hash())
                )));
            }
        }
        Ok(())
    }

    fn advance(&self, from: TransitionState, to: TransitionState) -> bool {
        let mut state = self.inner.state.lock();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Move to `Discarded` unless already finalized. Safe while execution is pending.
    pub(crate) fn discard(&self) -> bool {
        let mut state = self.inner.state.lock();
        match *state {
            TransitionState::Finalized => false,
            _ => {
                *state = TransitionState::Discarded;
                true
            }
        }
    }

    pub(crate) fn mark_finalized(&self) -> bool {
        self.advance(TransitionState::Executed, TransitionState::Finalized)
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.inner.id)
            .field("height", &self.inner.height)
            .field("parent_id", &self.inner.parent_id)
            .field("origin", &self.inner.origin.name())
            .field("txs", &self.inner.transactions.len())
            .field("state", &self.state())
            .finish()
    }
}
