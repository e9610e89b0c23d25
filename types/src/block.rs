//! Blocks and block identifiers

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_keys::{sha3_256, Hash};

use crate::address::Address;
use crate::signed::canonical_bytes;
use crate::validator::ValidatorList;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockId(Hash);

impl BlockId {
    pub const fn new(hash: Hash) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", hex::encode(self.0))
    }
}

/// Identity of a block payload split into transmittable parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartSetId {
    pub count: u16,
    pub hash: Hash,
}

impl PartSetId {
    /// A payload sent as a single part.
    pub fn single(payload: &[u8]) -> Self {
        Self {
            count: 1,
            hash: sha3_256(payload),
        }
    }
}

/// What vote verification needs to know about a block.
pub trait Block {
    fn height(&self) -> i64;
    fn id(&self) -> BlockId;
    /// Validators effective for the block after this one.
    fn next_validators(&self) -> &ValidatorList;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: i64,
    pub round: i32,
    pub parent_id: Option<BlockId>,
    pub timestamp: u64,
    pub proposer: Address,
    pub transactions_hash: Hash,
    /// Result bytes of the transition this block commits
    pub result: Vec<u8>,
    pub next_validators: ValidatorList,
}

impl BlockHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        canonical_bytes(self)
    }
}

impl Block for BlockHeader {
    fn height(&self) -> i64 {
        self.height
    }

    fn id(&self) -> BlockId {
        BlockId(sha3_256(&self.to_bytes()))
    }

    fn next_validators(&self) -> &ValidatorList {
        &self.next_validators
    }
}

/// A committed block with the serialized vote list that proves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBlock {
    pub header: BlockHeader,
    pub votes: Vec<u8>,
}

impl Block for FinalizedBlock {
    fn height(&self) -> i64 {
        self.header.height
    }

    fn id(&self) -> BlockId {
        self.header.id()
    }

    fn next_validators(&self) -> &ValidatorList {
        &self.header.next_validators
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: i64) -> BlockHeader {
        BlockHeader {
            height,
            round: 0,
            parent_id: None,
            timestamp: 42,
            proposer: Address::new([1; 20]),
            transactions_hash: [0; 32],
            result: vec![1, 2, 3],
            next_validators: ValidatorList::new(vec![Address::new([1; 20])]),
        }
    }

    #[test]
    fn test_id_covers_header_fields() {
        let a = header(2);
        let mut b = header(2);
        assert_eq!(a.id(), b.id());

        b.result = vec![9];
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_votes_are_outside_id() {
        let h = header(3);
        let block = FinalizedBlock {
            header: h.clone(),
            votes: vec![1, 2, 3],
        };
        assert_eq!(block.id(), h.id());
        assert_eq!(block.height(), 3);
    }
}
