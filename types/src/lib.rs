// ========== Core Modules ==========
pub mod address;
pub mod block;
pub mod config;
pub mod genesis;
pub mod signed; // SignedMessage and the Signable capability
pub mod transaction;
pub mod validator;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use address::Address;
pub use block::{Block, BlockHeader, BlockId, FinalizedBlock, PartSetId};
pub use config::ConsensusConfig;
pub use genesis::{GenesisAccount, GenesisConfig};
pub use signed::{canonical_bytes, Signable, SignedMessage};
pub use transaction::{Transaction, TransactionList, TransferPayload};
pub use validator::ValidatorList;

// Key material is re-exported so downstream crates need a single import path
pub use tessera_keys::{sha3_256, Hash, KeyError, KeyPair, PublicKey, Signature};

// Balances and transfer values
pub use primitive_types::U256;

// Error types
pub type TesseraResult<T> = Result<T, TesseraError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TesseraError {
    #[error("Bad signature")]
    BadSignature,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

impl From<bcs::Error> for TesseraError {
    fn from(e: bcs::Error) -> Self {
        TesseraError::Codec(e.to_string())
    }
}
