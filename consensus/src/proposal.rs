// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Block proposals

use serde::{Deserialize, Serialize};
use tessera_types::{
    canonical_bytes, BlockHeader, PartSetId, Signable, SignedMessage, TransactionList,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalContent {
    pub height: i64,
    /// Round the proposal is made in; a re-proposed block keeps its own
    /// `block.round`.
    pub round: i32,
    pub block: BlockHeader,
    pub transactions: TransactionList,
    /// Serialized vote list certifying the parent block
    pub last_commit: Vec<u8>,
}

impl ProposalContent {
    /// Identity of the block payload (header and transactions).
    pub fn part_set_id(&self) -> PartSetId {
        part_set_id(&self.block, &self.transactions)
    }
}

impl Signable for ProposalContent {
    fn signable_bytes(&self) -> Vec<u8> {
        canonical_bytes(self)
    }
}

pub type ProposalMessage = SignedMessage<ProposalContent>;

pub fn part_set_id(block: &BlockHeader, transactions: &TransactionList) -> PartSetId {
    PartSetId::single(&canonical_bytes(&(block, transactions)))
}
