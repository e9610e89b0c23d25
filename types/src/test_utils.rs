//! Deterministic keys and fixtures for tests

use primitive_types::U256;
use tessera_keys::{sha3_256, KeyPair};

use crate::address::Address;
use crate::genesis::{GenesisAccount, GenesisConfig};

/// Key pair derived from `seed`; the same seed always yields the same key.
pub fn test_key(seed: u64) -> KeyPair {
    let mut counter = 0u64;
    loop {
        let secret = sha3_256(&[seed.to_be_bytes(), counter.to_be_bytes()].concat());
        if let Ok(pair) = KeyPair::from_secret_bytes(&secret) {
            return pair;
        }
        counter += 1;
    }
}

pub fn test_keys(count: usize) -> Vec<KeyPair> {
    (0..count as u64).map(|i| test_key(1000 + i)).collect()
}

pub fn address_of(pair: &KeyPair) -> Address {
    Address::from_public_key(pair.public_key())
}

/// Genesis that funds every account with `balance` and makes `validators` the validator list.
pub fn test_genesis(
    accounts: &[KeyPair],
    validators: &[KeyPair],
    balance: impl Into<U256>,
) -> GenesisConfig {
    let balance = balance.into();
    GenesisConfig {
        accounts: accounts
            .iter()
            .enumerate()
            .map(|(i, pair)| GenesisAccount {
                name: format!("account-{}", i),
                address: address_of(pair),
                balance,
            })
            .collect(),
        message: "tessera test genesis".to_string(),
        validator_list: validators.iter().map(address_of).collect(),
    }
}
