//! Service error types

use tessera_storage::StorageError;
use tessera_types::TesseraError;
use thiserror::Error;

use crate::transition::{TransitionId, TransitionState};

/// Calls made in the wrong order or on the wrong transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Transition {id} is {actual:?}, expected {expected}")]
    InvalidState {
        id: TransitionId,
        expected: &'static str,
        actual: TransitionState,
    },

    #[error("Transition {0} is not a height-0 initial transition")]
    NotInitial(TransitionId),

    #[error("Parent transition {parent} is not the finalized transition")]
    ParentNotFinalized { parent: TransitionId },

    #[error("Parent transition {parent} has not been executed")]
    ParentNotExecuted { parent: TransitionId },

    #[error("Unknown transition {0}")]
    UnknownTransition(TransitionId),

    #[error("A local proposal for height {height} is already in progress")]
    ProposalInProgress { height: i64 },

    #[error("Height {height} is already finalized")]
    HeightAlreadyFinalized { height: i64 },

    #[error("No transition has been finalized yet")]
    NothingFinalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Validation failed: {0}")]
    Validation(TesseraError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transition discarded")]
    Discarded,

    #[error("No Tokio runtime available to execute the transition")]
    NoRuntime,
}

impl TransitionError {
    /// Transient failures the caller may retry (re-propose or back off).
    pub fn is_retryable(&self) -> bool {
        match self {
            TransitionError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Rejections from the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Invalid transaction: {0}")]
    Invalid(#[from] TesseraError),

    #[error("Transaction already known")]
    Duplicate,

    #[error("Transaction pool is full ({capacity})")]
    Full { capacity: usize },
}
