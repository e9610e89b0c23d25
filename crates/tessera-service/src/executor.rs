//! Transfer executor
//!
//! Applies an ordered transaction list to a parent world state. A failing
//! transaction never aborts the block; its receipt records the reason.

use serde::{Deserialize, Serialize};
use tessera_storage::{Account, WorldState};
use tessera_types::{canonical_bytes, sha3_256, Hash, Transaction, TransactionList};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub status: ReceiptStatus,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub state: WorldState,
    pub receipts: Vec<Receipt>,
}

pub fn receipts_root(receipts: &[Receipt]) -> Hash {
    sha3_256(&canonical_bytes(receipts))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferExecutor;

impl TransferExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, parent: &WorldState, transactions: &TransactionList) -> ExecutionOutput {
        let mut state = parent.clone();
        let receipts: Vec<Receipt> = transactions
            .iter()
            .map(|tx| Receipt {
                tx_hash: tx.hash(),
                status: Self::apply(&mut state, tx),
            })
            .collect();

        debug!(
            txs = receipts.len(),
            failed = receipts.iter().filter(|r| !r.is_success()).count(),
            "Executed transaction list"
        );
        ExecutionOutput { state, receipts }
    }

    fn apply(state: &mut WorldState, tx: &Transaction) -> ReceiptStatus {
        let payload = tx.content();
        let sender = state.account(&payload.from);

        if payload.nonce != sender.nonce {
            trace!(from = %payload.from, expected = sender.nonce, got = payload.nonce, "Nonce mismatch");
            return ReceiptStatus::Failure(format!(
                "nonce mismatch: expected {}, got {}",
                sender.nonce, payload.nonce
            ));
        }

        let bumped = Account {
            balance: sender.balance,
            nonce: sender.nonce + 1,
        };

        if sender.balance < payload.value {
            state.set_account(payload.from, bumped);
            return ReceiptStatus::Failure(format!(
                "insufficient balance: {} < {}",
                sender.balance, payload.value
            ));
        }

        let receiver = state.account(&payload.to);
        let Some(credited) = receiver.balance.checked_add(payload.value) else {
            state.set_account(payload.from, bumped);
            return ReceiptStatus::Failure("receiver balance overflow".to_string());
        };

        state.set_account(
            payload.from,
            Account {
                balance: sender.balance - payload.value,
                nonce: bumped.nonce,
            },
        );
        state.set_account(
            payload.to,
            Account {
                balance: credited,
                nonce: receiver.nonce,
            },
        );
        ReceiptStatus::Success
    }
}
