// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus wire messages

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::proposal::ProposalMessage;
use crate::vote::VoteMessage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Proposal(ProposalMessage),
    Vote(VoteMessage),
}

impl ConsensusMessage {
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        Ok(bcs::from_bytes(bytes)?)
    }

    pub fn height(&self) -> i64 {
        match self {
            ConsensusMessage::Proposal(p) => p.content().height,
            ConsensusMessage::Vote(v) => v.content().height,
        }
    }

    pub fn round(&self) -> i32 {
        match self {
            ConsensusMessage::Proposal(p) => p.content().round,
            ConsensusMessage::Vote(v) => v.content().round,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConsensusMessage::Proposal(_) => "proposal",
            ConsensusMessage::Vote(_) => "vote",
        }
    }
}
