//! World state
//!
//! Accounts and the active validator list. Backed by a persistent ordered map
//! so that each transition can clone its parent's state in O(1) and the
//! canonical encoding is deterministic.

use im::OrdMap;
use serde::{Deserialize, Serialize};
use tessera_types::{sha3_256, Address, GenesisConfig, Hash, ValidatorList, U256};

use crate::error::StorageResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: U256,
    pub nonce: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    accounts: OrdMap<Address, Account>,
    validators: ValidatorList,
}

impl WorldState {
    pub fn new(validators: ValidatorList) -> Self {
        Self {
            accounts: OrdMap::new(),
            validators,
        }
    }

    pub fn from_genesis(genesis: &GenesisConfig) -> Self {
        let mut state = Self::new(genesis.validators());
        for account in &genesis.accounts {
            state.set_account(
                account.address,
                Account {
                    balance: account.balance,
                    nonce: 0,
                },
            );
        }
        state
    }

    /// The account at `address`; unknown addresses read as empty accounts.
    pub fn account(&self, address: &Address) -> Account {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    pub fn set_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.account(address).balance
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn validators(&self) -> &ValidatorList {
        &self.validators
    }

    pub fn set_validators(&mut self, validators: ValidatorList) {
        self.validators = validators;
    }

    /// Sum of all balances, saturating.
    pub fn total_supply(&self) -> U256 {
        self.accounts
            .values()
            .fold(U256::zero(), |sum, a| sum.saturating_add(a.balance))
    }

    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        Ok(bcs::from_bytes(bytes)?)
    }

    /// SHA3-256 of the canonical encoding.
    pub fn state_root(&self) -> StorageResult<Hash> {
        Ok(sha3_256(&self.to_bytes()?))
    }
}
