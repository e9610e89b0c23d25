// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Compact commit certificates
//!
//! A [`VoteList`] keeps only what differs between the precommits for one
//! block: their signatures. Height, type and block id come from the block the
//! list is checked against, so every signature is verified by rebuilding the
//! vote it was made over.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tessera_types::{sha3_256, Block, Hash, PartSetId, Signature, SignedMessage};

use crate::error::VoteListError;
use crate::vote::{VoteContent, VoteMessage, VoteType};

/// `votes` out of `validators` is a quorum when strictly more than two
/// thirds, with the threshold rounded down.
pub fn has_quorum(votes: usize, validators: usize) -> bool {
    votes > validators * 2 / 3
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteList {
    round: i32,
    block_part_set_id: Option<PartSetId>,
    signatures: Vec<Signature>,
}

impl VoteList {
    /// Collect precommits for one block.
    ///
    /// Round and part set id are taken from the first vote.
    ///
    /// # Panics
    ///
    /// If the votes are not all for the same block id.
    pub fn from_votes(votes: &[VoteMessage]) -> Self {
        let Some(first) = votes.first() else {
            return Self::default();
        };
        let block_id = first.content().block_id;
        let signatures = votes
            .iter()
            .map(|vote| {
                if vote.content().block_id != block_id {
                    panic!(
                        "vote list mixes block ids {:?} and {:?}",
                        block_id,
                        vote.content().block_id
                    );
                }
                *vote.signature()
            })
            .collect();
        Self {
            round: first.content().round,
            block_part_set_id: first.content().block_part_set_id,
            signatures,
        }
    }

    /// Decode a vote list; `None` on malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bcs::from_bytes(bytes).ok()
    }

    pub fn round(&self) -> i32 {
        self.round
    }

    pub fn block_part_set_id(&self) -> Option<&PartSetId> {
        self.block_part_set_id.as_ref()
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Canonical encoding; empty if encoding fails.
    pub fn bytes(&self) -> Vec<u8> {
        bcs::to_bytes(self).unwrap_or_default()
    }

    pub fn hash(&self) -> Hash {
        sha3_256(&self.bytes())
    }

    /// Check that this list certifies `block`.
    ///
    /// Height 1 is finalized without votes and accepts only an empty list.
    /// Otherwise every signature must be a precommit for `block` by a distinct
    /// member of `block.next_validators()`, and there must be more than two
    /// thirds of them.
    pub fn verify<B: Block + ?Sized>(&self, block: &B) -> Result<(), VoteListError> {
        if block.height() == 1 {
            return match self.signatures.len() {
                0 => Ok(()),
                count => Err(VoteListError::UnexpectedVoters { count }),
            };
        }

        let validators = block.next_validators();
        if let Some(first) = self.signatures.first() {
            let template = SignedMessage::new(
                VoteContent {
                    height: block.height(),
                    round: self.round,
                    vote_type: VoteType::Precommit,
                    block_id: Some(block.id()),
                    block_part_set_id: self.block_part_set_id,
                },
                *first,
            );
            // warm the content hash so every substitution reuses it
            template.hash();

            let mut seen = HashSet::with_capacity(self.signatures.len());
            for (index, signature) in self.signatures.iter().enumerate() {
                let vote = template.with_signature(*signature);
                let address = vote
                    .address()
                    .ok_or(VoteListError::BadSignature { index })?;
                if validators.index_of(&address).is_none() {
                    return Err(VoteListError::BadVoter { index, address });
                }
                if !seen.insert(address) {
                    return Err(VoteListError::DuplicateVoter { index, address });
                }
            }
        }

        let votes = self.signatures.len();
        if !has_quorum(votes, validators.len()) {
            return Err(VoteListError::InsufficientVotes {
                votes,
                validators: validators.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::sign_vote;
    use tessera_types::test_utils::{address_of, test_key, test_keys};
    use tessera_types::{Address, BlockHeader, KeyPair, TransactionList, ValidatorList};

    fn block(height: i64, keys: &[KeyPair]) -> BlockHeader {
        BlockHeader {
            height,
            round: 0,
            parent_id: None,
            timestamp: 1_700_000_000,
            proposer: address_of(&keys[0]),
            transactions_hash: TransactionList::default().hash(),
            result: vec![7; 64],
            next_validators: ValidatorList::new(keys.iter().map(address_of).collect()),
        }
    }

    fn precommits(block: &BlockHeader, round: i32, signers: &[KeyPair]) -> Vec<VoteMessage> {
        let parts = PartSetId::single(b"block parts");
        signers
            .iter()
            .map(|key| {
                sign_vote(
                    key,
                    block.height,
                    round,
                    VoteType::Precommit,
                    Some((block.id(), parts)),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_quorum_threshold() {
        assert!(!has_quorum(0, 1));
        assert!(has_quorum(1, 1));
        assert!(!has_quorum(2, 4));
        assert!(has_quorum(3, 4));
        assert!(!has_quorum(2, 3));
        assert!(has_quorum(3, 3));
        assert!(!has_quorum(4, 7));
        assert!(has_quorum(5, 7));
    }

    #[test]
    fn test_three_of_four_certifies() {
        let keys = test_keys(4);
        let block = block(10, &keys);
        let list = VoteList::from_votes(&precommits(&block, 2, &keys[..3]));

        assert_eq!(list.round(), 2);
        assert_eq!(list.len(), 3);
        assert_eq!(list.verify(&block), Ok(()));
    }

    #[test]
    fn test_two_of_four_is_insufficient() {
        let keys = test_keys(4);
        let block = block(10, &keys);
        let list = VoteList::from_votes(&precommits(&block, 0, &keys[..2]));

        assert_eq!(
            list.verify(&block),
            Err(VoteListError::InsufficientVotes {
                votes: 2,
                validators: 4
            })
        );
    }

    #[test]
    fn test_height_one_takes_no_voters() {
        let keys = test_keys(4);
        let genesis = block(1, &keys);
        assert_eq!(VoteList::default().verify(&genesis), Ok(()));

        let list = VoteList::from_votes(&precommits(&genesis, 0, &keys[..1]));
        assert_eq!(
            list.verify(&genesis),
            Err(VoteListError::UnexpectedVoters { count: 1 })
        );
    }

    #[test]
    fn test_empty_list_fails_above_height_one() {
        let keys = test_keys(4);
        assert!(matches!(
            VoteList::default().verify(&block(2, &keys)),
            Err(VoteListError::InsufficientVotes { votes: 0, .. })
        ));
    }

    #[test]
    fn test_outsider_is_bad_voter() {
        let keys = test_keys(4);
        let block = block(5, &keys);
        let outsider = test_key(99);
        let mut votes = precommits(&block, 0, &keys[..3]);
        votes.extend(precommits(&block, 0, std::slice::from_ref(&outsider)));

        let list = VoteList::from_votes(&votes);
        assert_eq!(
            list.verify(&block),
            Err(VoteListError::BadVoter {
                index: 3,
                address: address_of(&outsider)
            })
        );
    }

    #[test]
    fn test_repeated_signer_is_rejected() {
        let keys = test_keys(4);
        let block = block(5, &keys);
        let mut votes = precommits(&block, 0, &keys[..2]);
        votes.push(votes[0].clone());

        let list = VoteList::from_votes(&votes);
        assert_eq!(
            list.verify(&block),
            Err(VoteListError::DuplicateVoter {
                index: 2,
                address: address_of(&keys[0])
            })
        );
    }

    #[test]
    fn test_votes_for_another_block_do_not_count() {
        let keys = test_keys(4);
        let voted = block(5, &keys);
        let mut other = voted.clone();
        other.result = vec![8; 64];

        // signatures over `voted` recover to unrelated addresses against `other`
        let list = VoteList::from_votes(&precommits(&voted, 0, &keys[..3]));
        let err = list.verify(&other).unwrap_err();
        assert!(matches!(
            err,
            VoteListError::BadVoter { index: 0, .. } | VoteListError::BadSignature { index: 0 }
        ));
    }

    #[test]
    fn test_bytes_round_trip() {
        let keys = test_keys(4);
        let block = block(10, &keys);
        let list = VoteList::from_votes(&precommits(&block, 1, &keys));

        let decoded = VoteList::from_bytes(&list.bytes()).unwrap();
        assert_eq!(decoded, list);
        assert_eq!(decoded.hash(), list.hash());
        assert_eq!(decoded.verify(&block), Ok(()));

        assert!(VoteList::from_bytes(&[0xff, 0x01]).is_none());
        assert_ne!(list.hash(), VoteList::default().hash());
    }

    #[test]
    #[should_panic(expected = "mixes block ids")]
    fn test_mixed_blocks_panic() {
        let keys = test_keys(2);
        let a = block(3, &keys);
        let mut votes = precommits(&a, 0, &keys[..1]);
        votes.push(sign_vote(&keys[1], 3, 0, VoteType::Precommit, None).unwrap());
        VoteList::from_votes(&votes);
    }

    #[test]
    fn test_addresses_resolve_through_next_validators() {
        let keys = test_keys(4);
        let mut block = block(8, &keys);
        // rotate the set out from under the signers
        block.next_validators = ValidatorList::new(vec![Address::new([1; 20])]);
        let list = VoteList::from_votes(&precommits(&block, 0, &keys[..3]));
        assert!(matches!(
            list.verify(&block),
            Err(VoteListError::BadVoter { index: 0, .. })
        ));
    }
}
