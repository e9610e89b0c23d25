//! Genesis document
//!
//! ```json
//! {
//!   "accounts": [
//!     { "name": "treasury", "address": "hx...", "balance": "0x2961fff8ca4a623278000000000000000" }
//!   ],
//!   "message": "genesis",
//!   "validatorlist": ["hx...", "hx..."]
//! }
//! ```

use std::path::Path;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tessera_keys::{sha3_256, Hash};

use crate::address::Address;
use crate::signed::canonical_bytes;
use crate::validator::ValidatorList;
use crate::{TesseraError, TesseraResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    #[serde(default)]
    pub name: String,
    pub address: Address,
    #[serde(serialize_with = "serialize_balance", deserialize_with = "deserialize_balance")]
    pub balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "validatorlist")]
    pub validator_list: Vec<Address>,
}

impl GenesisConfig {
    pub fn from_json(bytes: &[u8]) -> TesseraResult<Self> {
        let genesis: Self = serde_json::from_slice(bytes)
            .map_err(|e| TesseraError::InvalidData(format!("genesis: {}", e)))?;
        genesis.validate()?;
        Ok(genesis)
    }

    pub fn load(path: impl AsRef<Path>) -> TesseraResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| TesseraError::Storage(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&bytes)
    }

    pub fn validate(&self) -> TesseraResult<()> {
        if self.validator_list.is_empty() {
            return Err(TesseraError::InvalidData(
                "genesis has no validators".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.address) {
                return Err(TesseraError::InvalidData(format!(
                    "duplicate genesis account {}",
                    account.address
                )));
            }
        }
        Ok(())
    }

    pub fn validators(&self) -> ValidatorList {
        ValidatorList::new(self.validator_list.clone())
    }

    pub fn hash(&self) -> Hash {
        sha3_256(&canonical_bytes(self))
    }
}

fn serialize_balance<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{:x}", value))
}

/// Accepts `0x`-prefixed hex or plain decimal.
fn deserialize_balance<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_balance(&text).map_err(serde::de::Error::custom)
}

fn parse_balance(text: &str) -> Result<U256, String> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) if !hex.is_empty() && hex.len() <= 64 => {
            U256::from_str_radix(hex, 16).map_err(|e| e.to_string())
        }
        Some(_) => Err("expected 1 to 64 hex digits".to_string()),
        None => U256::from_dec_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| format!("balance {:?}: {}", text, e))
}
