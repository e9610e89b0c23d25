// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Proposer Election Trait
//!
//! Different election strategies implement [`ProposerElection`]; every honest
//! validator must compute the same proposer for a given height and round.

use tessera_types::Address;

pub type Height = i64;

/// Round within a height, restarting at 0 for every new height
pub type Round = i32;

/// ProposerElection picks the validator allowed to propose a block at a
/// given height and round.
pub trait ProposerElection: Send + Sync {
    /// Check if `address` is the proposer for `height`/`round`.
    fn is_valid_proposer(&self, address: &Address, height: Height, round: Round) -> bool {
        self.get_valid_proposer(height, round).as_ref() == Some(address)
    }

    /// Return the proposer for `height`/`round`, `None` without candidates.
    fn get_valid_proposer(&self, height: Height, round: Round) -> Option<Address>;
}
