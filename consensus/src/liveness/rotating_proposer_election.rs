// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Rotating Proposer Election
//!
//! Validators take turns proposing. The turn advances with both the height
//! and the round, so a validator that stalls a round hands over to the next
//! one and every height starts with a different proposer.

use tessera_types::{Address, ValidatorList};

use super::proposer_election::{Height, ProposerElection, Round};

/// Rotating proposer election using round-robin rotation.
///
/// ```text
/// proposer_index = ((height + round) / contiguous_rounds) % num_validators
/// ```
#[derive(Debug, Clone)]
pub struct RotatingProposer {
    /// Ordered validator list (all honest replicas agree on this order)
    proposers: ValidatorList,

    /// Number of contiguous turns a proposer is active in a row.
    contiguous_rounds: u32,
}

impl RotatingProposer {
    pub fn new(proposers: ValidatorList) -> Self {
        Self::with_contiguous_rounds(proposers, 1)
    }

    pub fn with_contiguous_rounds(proposers: ValidatorList, contiguous_rounds: u32) -> Self {
        Self {
            proposers,
            contiguous_rounds: contiguous_rounds.max(1),
        }
    }

    fn get_proposer_index(&self, height: Height, round: Round) -> usize {
        let turn = height.max(0) as u64 + round.max(0) as u64;
        let effective = turn / u64::from(self.contiguous_rounds);
        (effective % self.proposers.len() as u64) as usize
    }

    pub fn proposer_count(&self) -> usize {
        self.proposers.len()
    }

    pub fn contiguous_rounds(&self) -> u32 {
        self.contiguous_rounds
    }
}

impl ProposerElection for RotatingProposer {
    fn get_valid_proposer(&self, height: Height, round: Round) -> Option<Address> {
        if self.proposers.is_empty() {
            return None;
        }
        self.proposers
            .get(self.get_proposer_index(height, round))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validators(count: u8) -> ValidatorList {
        ValidatorList::new((1..=count).map(|i| Address::new([i; 20])).collect())
    }

    fn v(i: u8) -> Option<Address> {
        Some(Address::new([i; 20]))
    }

    #[test]
    fn test_rotating_proposer_basic() {
        let election = RotatingProposer::new(validators(3));

        assert_eq!(election.get_valid_proposer(0, 0), v(1));
        assert_eq!(election.get_valid_proposer(1, 0), v(2));
        assert_eq!(election.get_valid_proposer(2, 0), v(3));
        assert_eq!(election.get_valid_proposer(3, 0), v(1)); // Wraps around
    }

    #[test]
    fn test_round_advances_turn() {
        let election = RotatingProposer::new(validators(4));

        assert_eq!(election.get_valid_proposer(2, 0), v(3));
        assert_eq!(election.get_valid_proposer(2, 1), v(4));
        assert_eq!(election.get_valid_proposer(2, 2), v(1));
        assert_eq!(
            election.get_valid_proposer(2, 1),
            election.get_valid_proposer(3, 0)
        );
    }

    #[test]
    fn test_rotating_proposer_contiguous() {
        let election = RotatingProposer::with_contiguous_rounds(validators(3), 2);

        assert_eq!(election.get_valid_proposer(0, 0), v(1));
        assert_eq!(election.get_valid_proposer(0, 1), v(1));
        assert_eq!(election.get_valid_proposer(2, 0), v(2));
        assert_eq!(election.get_valid_proposer(2, 1), v(2));
        assert_eq!(election.get_valid_proposer(4, 0), v(3));
        assert_eq!(election.get_valid_proposer(6, 0), v(1)); // Wraps around
        assert_eq!(election.contiguous_rounds(), 2);
    }

    #[test]
    fn test_is_valid_proposer() {
        let election = RotatingProposer::new(validators(3));

        assert!(election.is_valid_proposer(&Address::new([1; 20]), 0, 0));
        assert!(!election.is_valid_proposer(&Address::new([2; 20]), 0, 0));
        assert!(election.is_valid_proposer(&Address::new([2; 20]), 0, 1));
    }

    #[test]
    fn test_empty_proposers() {
        let election = RotatingProposer::new(ValidatorList::default());
        assert_eq!(election.get_valid_proposer(5, 0), None);
        assert_eq!(election.proposer_count(), 0);
    }

    #[test]
    fn test_single_proposer() {
        let election = RotatingProposer::new(validators(1));

        for height in 1..10 {
            assert_eq!(election.get_valid_proposer(height, height as i32 % 3), v(1));
        }
        assert_eq!(election.proposer_count(), 1);
    }
}
