// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Vote accumulation for one height, round and vote type

use std::collections::HashMap;

use tessera_types::{Address, BlockId, PartSetId};
use tracing::warn;

use crate::vote::{VoteMessage, VoteType};
use crate::vote_list::has_quorum;

/// What a vote is for: a block with its part set, or nil.
pub type VoteTarget = (Option<BlockId>, Option<PartSetId>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddVoteResult {
    Added,
    /// Same vote seen before
    Duplicate,
    /// The validator already voted for another target; the new vote is dropped
    Equivocation,
}

#[derive(Debug)]
pub struct VoteSet {
    height: i64,
    round: i32,
    vote_type: VoteType,
    votes: HashMap<Address, VoteMessage>,
    /// Voters per target in arrival order
    by_target: HashMap<VoteTarget, Vec<Address>>,
    equivocations: Vec<(Address, VoteMessage)>,
}

impl VoteSet {
    pub fn new(height: i64, round: i32, vote_type: VoteType) -> Self {
        Self {
            height,
            round,
            vote_type,
            votes: HashMap::new(),
            by_target: HashMap::new(),
            equivocations: Vec::new(),
        }
    }

    /// Record `vote` from `voter`. The caller has already checked the
    /// signature and that `voter` is a validator.
    pub fn add(&mut self, voter: Address, vote: VoteMessage) -> AddVoteResult {
        debug_assert_eq!(vote.content().height, self.height);
        debug_assert_eq!(vote.content().round, self.round);
        debug_assert_eq!(vote.content().vote_type, self.vote_type);

        if let Some(existing) = self.votes.get(&voter) {
            if target_of(existing) == target_of(&vote) {
                return AddVoteResult::Duplicate;
            }
            warn!(
                voter = %voter,
                height = self.height,
                round = self.round,
                vote_type = ?self.vote_type,
                "Conflicting vote, keeping the first"
            );
            self.equivocations.push((voter, vote));
            return AddVoteResult::Equivocation;
        }

        self.by_target
            .entry(target_of(&vote))
            .or_default()
            .push(voter);
        self.votes.insert(voter, vote);
        AddVoteResult::Added
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn voters(&self) -> impl Iterator<Item = Address> + '_ {
        self.votes.keys().copied()
    }

    pub fn count_for(&self, target: &VoteTarget) -> usize {
        self.by_target.get(target).map_or(0, Vec::len)
    }

    /// The target more than two thirds of `validators` voted for, if any.
    pub fn quorum_target(&self, validators: usize) -> Option<VoteTarget> {
        self.by_target
            .iter()
            .find(|(_, voters)| has_quorum(voters.len(), validators))
            .map(|(target, _)| *target)
    }

    /// Votes for `target` in arrival order.
    pub fn votes_for(&self, target: &VoteTarget) -> Vec<VoteMessage> {
        self.by_target
            .get(target)
            .map(|voters| {
                voters
                    .iter()
                    .filter_map(|voter| self.votes.get(voter).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn equivocations(&self) -> &[(Address, VoteMessage)] {
        &self.equivocations
    }
}

fn target_of(vote: &VoteMessage) -> VoteTarget {
    (vote.content().block_id, vote.content().block_part_set_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::sign_vote;
    use tessera_types::test_utils::{address_of, test_keys};
    use tessera_types::KeyPair;

    fn target(byte: u8) -> (BlockId, PartSetId) {
        (BlockId::new([byte; 32]), PartSetId::single(&[byte]))
    }

    fn prevote(key: &KeyPair, block: Option<(BlockId, PartSetId)>) -> VoteMessage {
        sign_vote(key, 4, 1, VoteType::Prevote, block).unwrap()
    }

    #[test]
    fn test_quorum_per_target() {
        let keys = test_keys(4);
        let mut set = VoteSet::new(4, 1, VoteType::Prevote);
        let a = target(1);
        let a_key = (Some(a.0), Some(a.1));

        for key in &keys[..2] {
            assert_eq!(set.add(address_of(key), prevote(key, Some(a))), AddVoteResult::Added);
        }
        set.add(address_of(&keys[2]), prevote(&keys[2], None));
        assert_eq!(set.len(), 3);
        assert_eq!(set.quorum_target(4), None);

        set.add(address_of(&keys[3]), prevote(&keys[3], Some(a)));
        assert_eq!(set.count_for(&a_key), 3);
        assert_eq!(set.count_for(&(None, None)), 1);
        assert_eq!(set.quorum_target(4), Some(a_key));

        let votes = set.votes_for(&a_key);
        let voters: Vec<_> = votes.iter().map(|v| v.address().unwrap()).collect();
        assert_eq!(
            voters,
            vec![
                address_of(&keys[0]),
                address_of(&keys[1]),
                address_of(&keys[3])
            ]
        );
    }

    #[test]
    fn test_nil_quorum() {
        let keys = test_keys(4);
        let mut set = VoteSet::new(4, 1, VoteType::Prevote);
        for key in &keys[..3] {
            set.add(address_of(key), prevote(key, None));
        }
        assert_eq!(set.quorum_target(4), Some((None, None)));
    }

    #[test]
    fn test_equivocation_is_recorded_and_ignored() {
        let keys = test_keys(4);
        let mut set = VoteSet::new(4, 1, VoteType::Prevote);
        let voter = address_of(&keys[0]);

        assert_eq!(set.add(voter, prevote(&keys[0], Some(target(1)))), AddVoteResult::Added);
        assert_eq!(
            set.add(voter, prevote(&keys[0], Some(target(1)))),
            AddVoteResult::Duplicate
        );
        assert_eq!(
            set.add(voter, prevote(&keys[0], Some(target(2)))),
            AddVoteResult::Equivocation
        );

        assert_eq!(set.len(), 1);
        assert_eq!(set.count_for(&(Some(target(2).0), Some(target(2).1))), 0);
        assert_eq!(set.equivocations().len(), 1);
        assert_eq!(set.equivocations()[0].0, voter);
    }
}
