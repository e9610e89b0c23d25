//! Recoverable secp256k1 signatures

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{KeyError, KeyResult};
use crate::hash::Hash;
use crate::keypair::PublicKey;

/// r (32) || s (32) || recovery id (1)
pub const SIGNATURE_LENGTH: usize = 65;

/// A 65-byte recoverable ECDSA signature over a 32-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> KeyResult<Self> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignatureLength {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; SIGNATURE_LENGTH];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    pub(crate) fn from_parts(sig: &EcdsaSignature, recovery_id: RecoveryId) -> Self {
        let mut raw = [0u8; SIGNATURE_LENGTH];
        raw[..64].copy_from_slice(&sig.to_bytes());
        raw[64] = recovery_id.to_byte();
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Recover the public key that produced this signature over `digest`.
    pub fn recover_public_key(&self, digest: &Hash) -> KeyResult<PublicKey> {
        let sig = EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.0[64])
            .ok_or_else(|| KeyError::InvalidSignature(format!("bad recovery id {}", self.0[64])))?;
        let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
            .map_err(|e| KeyError::RecoveryFailed(e.to_string()))?;
        Ok(PublicKey::from(key))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
