// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus error types

use tessera_service::TransitionError;
use tessera_storage::StorageError;
use tessera_types::{Address, BlockId, TesseraError};
use thiserror::Error;

use crate::broadcaster::BroadcastError;

/// Reasons a vote list does not certify a block. The list is rejected as a
/// whole; no entry is ever partially accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteListError {
    #[error("Bad signature at index {index} in vote list")]
    BadSignature { index: usize },

    #[error("Bad voter {address} at index {index} in vote list")]
    BadVoter { index: usize, address: Address },

    #[error("Duplicate voter {address} at index {index} in vote list")]
    DuplicateVoter { index: usize, address: Address },

    #[error("Voters ({count}) for height 1")]
    UnexpectedVoters { count: usize },

    #[error("Votes ({votes}) <= 2/3 of validators ({validators})")]
    InsufficientVotes { votes: usize, validators: usize },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Bad signature on consensus message")]
    BadSignature,

    #[error("Message from unknown validator {0}")]
    UnknownValidator(Address),

    #[error("Invalid proposer {actual} for height {height} round {round}")]
    InvalidProposer {
        height: i64,
        round: i32,
        actual: Address,
    },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Result mismatch for block {block_id} at height {height}")]
    ResultMismatch { height: i64, block_id: BlockId },

    #[error("Invalid commit: {0}")]
    InvalidCommit(#[from] VoteListError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Signing failed: {0}")]
    Signing(#[from] TesseraError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Network error: {0}")]
    Network(#[from] BroadcastError),

    #[error("Missing committed block at height {0}")]
    MissingBlock(i64),

    #[error("Engine not started")]
    NotStarted,
}

impl From<bcs::Error> for EngineError {
    fn from(e: bcs::Error) -> Self {
        EngineError::Codec(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
