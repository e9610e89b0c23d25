//! Transfer transactions

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tessera_keys::{sha3_256, Hash, KeyPair};

use crate::address::Address;
use crate::signed::{canonical_bytes, Signable, SignedMessage};
use crate::{TesseraError, TesseraResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub nonce: u64,
    /// Client timestamp in milliseconds, keeps otherwise identical transfers distinct
    pub timestamp: u64,
}

impl Signable for TransferPayload {
    fn signable_bytes(&self) -> Vec<u8> {
        canonical_bytes(self)
    }
}

pub type Transaction = SignedMessage<TransferPayload>;

impl SignedMessage<TransferPayload> {
    pub fn transfer(
        key_pair: &KeyPair,
        to: Address,
        value: impl Into<U256>,
        nonce: u64,
        timestamp: u64,
    ) -> TesseraResult<Self> {
        let payload = TransferPayload {
            from: Address::from_public_key(key_pair.public_key()),
            to,
            value: value.into(),
            nonce,
            timestamp,
        };
        SignedMessage::sign(payload, key_pair)
    }

    /// Signature and structural checks. State dependent checks (nonce,
    /// balance) happen at execution.
    pub fn validate(&self) -> TesseraResult<()> {
        self.verify()?;
        let payload = self.content();
        if self.address() != Some(payload.from) {
            return Err(TesseraError::InvalidTransaction(format!(
                "signer does not match sender {}",
                payload.from
            )));
        }
        if payload.value.is_zero() {
            return Err(TesseraError::InvalidTransaction("zero value".to_string()));
        }
        if payload.from == payload.to {
            return Err(TesseraError::InvalidTransaction(
                "sender and receiver are the same".to_string(),
            ));
        }
        Ok(())
    }
}

/// An ordered batch of transactions, as carried by a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionList {
    transactions: Vec<Transaction>,
}

impl TransactionList {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    pub fn as_slice(&self) -> &[Transaction] {
        &self.transactions
    }

    /// SHA3-256 over the ordered transaction hashes.
    pub fn hash(&self) -> Hash {
        let hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        sha3_256(&canonical_bytes(&hashes))
    }

    pub fn to_bytes(&self) -> TesseraResult<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> TesseraResult<Self> {
        Ok(bcs::from_bytes(bytes)?)
    }
}

impl From<Vec<Transaction>> for TransactionList {
    fn from(transactions: Vec<Transaction>) -> Self {
        Self::new(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{address_of, test_key};

    #[test]
    fn test_valid_transfer() {
        let alice = test_key(1);
        let tx = Transaction::transfer(&alice, address_of(&test_key(2)), 10, 0, 1).unwrap();
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_value_and_self_transfer() {
        let alice = test_key(1);
        let zero = Transaction::transfer(&alice, address_of(&test_key(2)), 0, 0, 1).unwrap();
        assert!(matches!(
            zero.validate(),
            Err(TesseraError::InvalidTransaction(_))
        ));

        let to_self = Transaction::transfer(&alice, address_of(&alice), 5, 0, 1).unwrap();
        assert!(matches!(
            to_self.validate(),
            Err(TesseraError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_rejects_signer_mismatch() {
        let alice = test_key(1);
        let mallory = test_key(3);
        let payload = TransferPayload {
            from: address_of(&alice),
            to: address_of(&test_key(2)),
            value: U256::from(10),
            nonce: 0,
            timestamp: 1,
        };
        let tx = SignedMessage::sign(payload, &mallory).unwrap();
        assert!(matches!(
            tx.validate(),
            Err(TesseraError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_list_hash_depends_on_order() {
        let alice = test_key(1);
        let to = address_of(&test_key(2));
        let a = Transaction::transfer(&alice, to, 1, 0, 1).unwrap();
        let b = Transaction::transfer(&alice, to, 2, 1, 2).unwrap();

        let forward = TransactionList::new(vec![a.clone(), b.clone()]);
        let backward = TransactionList::new(vec![b, a]);
        assert_ne!(forward.hash(), backward.hash());

        let decoded = TransactionList::from_bytes(&forward.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.hash(), forward.hash());
        assert_eq!(decoded, forward);
    }
}
