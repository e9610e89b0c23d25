//! Pending transaction pool
//!
//! Transactions stay in the pool until a transition carrying them is
//! finalized, so a proposal that loses its round does not drop them. Entries
//! whose nonce the finalized state has already used are evicted on finalize.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use tessera_storage::WorldState;
use tessera_types::{Hash, Transaction, TransactionList};

use crate::error::PoolError;

#[derive(Debug, Default)]
struct PoolInner {
    queue: VecDeque<Transaction>,
    known: HashSet<Hash>,
}

#[derive(Debug)]
pub struct TransactionPool {
    inner: Mutex<PoolInner>,
    capacity: usize,
}

impl TransactionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            capacity,
        }
    }

    /// Verify and queue a transaction.
    pub fn add(&self, tx: Transaction) -> Result<(), PoolError> {
        tx.validate()?;
        let hash = tx.hash();

        let mut inner = self.inner.lock();
        if inner.known.contains(&hash) {
            return Err(PoolError::Duplicate);
        }
        if inner.queue.len() >= self.capacity {
            return Err(PoolError::Full {
                capacity: self.capacity,
            });
        }
        inner.known.insert(hash);
        inner.queue.push_back(tx);
        Ok(())
    }

    /// Up to `max` transactions in arrival order, skipping those whose nonce
    /// is already used in `state`. The pool keeps them.
    pub fn candidates(&self, max: usize, state: &WorldState) -> Vec<Transaction> {
        let inner = self.inner.lock();
        inner
            .queue
            .iter()
            .filter(|tx| {
                let payload = tx.content();
                payload.nonce >= state.account(&payload.from).nonce
            })
            .take(max)
            .cloned()
            .collect()
    }

    /// Drop transactions included in a finalized list.
    pub fn remove_committed(&self, transactions: &TransactionList) {
        if transactions.is_empty() {
            return;
        }
        let committed: HashSet<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
        let mut inner = self.inner.lock();
        inner.queue.retain(|tx| !committed.contains(&tx.hash()));
        inner.known.retain(|h| !committed.contains(h));
    }

    /// Drop transactions whose nonce `state` has already used. Returns how
    /// many were dropped.
    pub fn remove_stale(&self, state: &WorldState) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.queue.len();
        let mut stale = Vec::new();
        inner.queue.retain(|tx| {
            let payload = tx.content();
            let keep = payload.nonce >= state.account(&payload.from).nonce;
            if !keep {
                stale.push(tx.hash());
            }
            keep
        });
        for hash in &stale {
            inner.known.remove(hash);
        }
        before - inner.queue.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_storage::Account;
    use tessera_types::test_utils::{address_of, test_keys};
    use tessera_types::{Signature, SignedMessage, TesseraError, U256};

    #[test]
    fn test_add_rejects_duplicates_and_overflow() {
        let keys = test_keys(2);
        let to = address_of(&keys[1]);
        let pool = TransactionPool::new(2);

        let tx = Transaction::transfer(&keys[0], to, 1, 0, 1).unwrap();
        pool.add(tx.clone()).unwrap();
        assert_eq!(pool.add(tx), Err(PoolError::Duplicate));

        pool.add(Transaction::transfer(&keys[0], to, 1, 1, 2).unwrap())
            .unwrap();
        assert_eq!(
            pool.add(Transaction::transfer(&keys[0], to, 1, 2, 3).unwrap()),
            Err(PoolError::Full { capacity: 2 })
        );
    }

    #[test]
    fn test_add_rejects_bad_signature() {
        let keys = test_keys(2);
        let tx = Transaction::transfer(&keys[0], address_of(&keys[1]), 1, 0, 1).unwrap();
        let forged = SignedMessage::new(
            tx.content().clone(),
            Signature::from_bytes(&[0u8; 65]).unwrap(),
        );
        assert_eq!(
            TransactionPool::new(4).add(forged),
            Err(PoolError::Invalid(TesseraError::BadSignature))
        );
    }

    #[test]
    fn test_candidates_skip_stale_nonces_and_keep_pool() {
        let keys = test_keys(2);
        let (alice, bob) = (address_of(&keys[0]), address_of(&keys[1]));
        let pool = TransactionPool::new(10);
        for nonce in 0..3 {
            pool.add(Transaction::transfer(&keys[0], bob, 1, nonce, nonce).unwrap())
                .unwrap();
        }

        let mut state = WorldState::default();
        state.set_account(alice, Account { balance: U256::from(10), nonce: 1 });

        let picked = pool.candidates(10, &state);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].content().nonce, 1);
        assert_eq!(pool.candidates(1, &state).len(), 1);
        assert_eq!(pool.len(), 3);

        pool.remove_committed(&TransactionList::new(picked));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_used_nonces_free_capacity() {
        let keys = test_keys(2);
        let (alice, bob) = (address_of(&keys[0]), address_of(&keys[1]));
        let pool = TransactionPool::new(1);
        pool.add(Transaction::transfer(&keys[0], bob, 1, 0, 1).unwrap())
            .unwrap();

        // nonces 0..5 were used by transfers committed elsewhere
        let mut state = WorldState::default();
        state.set_account(alice, Account { balance: U256::from(10), nonce: 5 });
        pool.remove_committed(&TransactionList::default());
        let next = Transaction::transfer(&keys[0], bob, 1, 5, 2).unwrap();
        assert_eq!(
            pool.add(next.clone()),
            Err(PoolError::Full { capacity: 1 })
        );

        assert_eq!(pool.remove_stale(&state), 1);
        assert!(pool.is_empty());
        pool.add(next).unwrap();
        assert_eq!(pool.remove_stale(&state), 0);
        assert_eq!(pool.candidates(10, &state).len(), 1);
    }
}
