// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Tessera Keys
//!
//! secp256k1 key pairs and 65-byte recoverable signatures. Every signed
//! consensus message and transaction in Tessera is verified by recovering the
//! signer's public key from the signature and the SHA3-256 digest of the
//! signed bytes, so no explicit signer field travels on the wire.
//!
//! ```ignore
//! use tessera_keys::{sha3_256, KeyPair};
//!
//! let pair = KeyPair::generate();
//! let digest = sha3_256(b"payload");
//! let sig = pair.sign(&digest)?;
//! assert_eq!(&sig.recover_public_key(&digest)?, pair.public_key());
//! ```

pub mod error;
pub mod hash;
pub mod keypair;
pub mod signature;

pub use error::{KeyError, KeyResult};
pub use hash::{sha3_256, sha3_256_concat, Hash, HASH_LENGTH};
pub use keypair::{KeyPair, PublicKey};
pub use signature::{Signature, SIGNATURE_LENGTH};
