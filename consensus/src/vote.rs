// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Vote messages

use serde::{Deserialize, Serialize};
use tessera_types::{
    canonical_bytes, BlockId, KeyPair, PartSetId, Signable, SignedMessage, TesseraResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteType {
    Prevote,
    Precommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteContent {
    pub height: i64,
    pub round: i32,
    pub vote_type: VoteType,
    /// `None` is a nil vote
    pub block_id: Option<BlockId>,
    pub block_part_set_id: Option<PartSetId>,
}

impl Signable for VoteContent {
    fn signable_bytes(&self) -> Vec<u8> {
        canonical_bytes(self)
    }
}

pub type VoteMessage = SignedMessage<VoteContent>;

/// Sign a vote for `block` (or nil) at `height`/`round`.
pub fn sign_vote(
    key_pair: &KeyPair,
    height: i64,
    round: i32,
    vote_type: VoteType,
    block: Option<(BlockId, PartSetId)>,
) -> TesseraResult<VoteMessage> {
    let content = VoteContent {
        height,
        round,
        vote_type,
        block_id: block.map(|(id, _)| id),
        block_part_set_id: block.map(|(_, parts)| parts),
    };
    SignedMessage::sign(content, key_pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::test_utils::{address_of, test_key};

    #[test]
    fn test_vote_signer_is_recovered() {
        let key = test_key(7);
        let block = (BlockId::new([1; 32]), PartSetId::single(b"payload"));
        let vote = sign_vote(&key, 10, 0, VoteType::Precommit, Some(block)).unwrap();

        assert!(vote.verify().is_ok());
        assert_eq!(vote.address(), Some(address_of(&key)));
        assert_eq!(vote.content().block_id, Some(block.0));
    }

    #[test]
    fn test_vote_type_is_signed() {
        let key = test_key(7);
        let prevote = sign_vote(&key, 3, 1, VoteType::Prevote, None).unwrap();
        let precommit = sign_vote(&key, 3, 1, VoteType::Precommit, None).unwrap();
        assert_ne!(prevote.hash(), precommit.hash());

        // a prevote signature does not carry over to a precommit
        let moved = precommit.with_signature(*prevote.signature());
        assert_ne!(moved.address(), Some(address_of(&key)));
    }
}
