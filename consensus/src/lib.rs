// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Tessera Consensus Module
//!
//! BFT agreement on blocks produced by the transition pipeline:
//! - Signed prevote/precommit messages and per-round vote sets
//! - Compact vote lists certifying committed blocks
//! - Rotating proposer election
//! - The round-based engine tying proposals, votes and finalization together
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ConsensusEngine                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────┐   │
//! │  │   VoteSet    │  │   VoteList   │  │ ProposerElect.│   │
//! │  └──────────────┘  └──────────────┘  └───────────────┘   │
//! │          │                                  │            │
//! │  ┌───────▼──────────────┐       ┌───────────▼─────────┐  │
//! │  │ ConsensusBroadcaster │       │   ServiceManager    │  │
//! │  └──────────────────────┘       └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod broadcaster;
pub mod engine;
pub mod error;
pub mod liveness;
pub mod message;
pub mod proposal;
pub mod vote;
pub mod vote_list;
pub mod vote_set;

pub use broadcaster::{
    BroadcastError, BroadcastResult, ChannelBroadcaster, ConsensusBroadcaster, MockBroadcaster,
    NoOpBroadcaster,
};
pub use engine::{ConsensusEngine, Step};
pub use error::{EngineError, EngineResult, VoteListError};
pub use liveness::{ProposerElection, RotatingProposer};
pub use message::ConsensusMessage;
pub use proposal::{part_set_id, ProposalContent, ProposalMessage};
pub use vote::{sign_vote, VoteContent, VoteMessage, VoteType};
pub use vote_list::{has_quorum, VoteList};
pub use vote_set::{AddVoteResult, VoteSet, VoteTarget};
