//! Ordered validator lists with constant-time address lookup

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tessera_keys::{sha3_256, Hash};

use crate::address::Address;
use crate::signed::canonical_bytes;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Address>", into = "Vec<Address>")]
pub struct ValidatorList {
    validators: Vec<Address>,
    index: HashMap<Address, usize>,
}

impl ValidatorList {
    /// Build a list in the given order. Repeated addresses keep their first position.
    pub fn new(addresses: Vec<Address>) -> Self {
        let mut validators = Vec::with_capacity(addresses.len());
        let mut index = HashMap::with_capacity(addresses.len());
        for address in addresses {
            if !index.contains_key(&address) {
                index.insert(address, validators.len());
                validators.push(address);
            }
        }
        Self { validators, index }
    }

    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.index.get(address).copied()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    pub fn get(&self, index: usize) -> Option<&Address> {
        self.validators.get(index)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.validators.iter()
    }

    pub fn hash(&self) -> Hash {
        sha3_256(&canonical_bytes(&self.validators))
    }
}

impl PartialEq for ValidatorList {
    fn eq(&self, other: &Self) -> bool {
        self.validators == other.validators
    }
}

impl Eq for ValidatorList {}

impl From<Vec<Address>> for ValidatorList {
    fn from(addresses: Vec<Address>) -> Self {
        Self::new(addresses)
    }
}

impl From<ValidatorList> for Vec<Address> {
    fn from(list: ValidatorList) -> Self {
        list.validators
    }
}
