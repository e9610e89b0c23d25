//! Signed messages
//!
//! Every consensus message and transaction travels as a [`SignedMessage`]:
//! content that knows how to produce its canonical bytes, plus a recoverable
//! signature over the SHA3-256 digest of those bytes. The digest and the
//! recovered public key are computed on first use and cached for the lifetime
//! of the instance. Content cannot be mutated after construction.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tessera_keys::{sha3_256, Hash, KeyPair, PublicKey, Signature};

use crate::address::Address;
use crate::{TesseraError, TesseraResult};

/// Content that can be signed.
pub trait Signable {
    /// Canonical, deterministic byte encoding covered by the signature.
    fn signable_bytes(&self) -> Vec<u8>;
}

/// BCS encoding of `value`, or empty bytes if encoding fails.
///
/// BCS only fails on containers longer than 2^31 elements, which none of the
/// signed types can hold.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    bcs::to_bytes(value).unwrap_or_default()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SignedMessage<T> {
    content: T,
    signature: Signature,
    #[serde(skip)]
    hash: OnceLock<Hash>,
    #[serde(skip)]
    public_key: OnceLock<Option<PublicKey>>,
}

impl<T: Signable> SignedMessage<T> {
    pub fn new(content: T, signature: Signature) -> Self {
        Self {
            content,
            signature,
            hash: OnceLock::new(),
            public_key: OnceLock::new(),
        }
    }

    /// Sign `content` with `key_pair`.
    pub fn sign(content: T, key_pair: &KeyPair) -> TesseraResult<Self> {
        let hash = sha3_256(&content.signable_bytes());
        let signature = key_pair.sign(&hash)?;
        let message = Self::new(content, signature);
        let _ = message.hash.set(hash);
        let _ = message.public_key.set(Some(key_pair.public_key().clone()));
        Ok(message)
    }

    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// SHA3-256 of the canonical bytes, computed once.
    pub fn hash(&self) -> Hash {
        *self
            .hash
            .get_or_init(|| sha3_256(&self.content.signable_bytes()))
    }

    /// The signer's public key, or `None` if recovery fails.
    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key
            .get_or_init(|| self.signature.recover_public_key(&self.hash()).ok())
            .as_ref()
    }

    pub fn address(&self) -> Option<Address> {
        self.public_key().map(Address::from_public_key)
    }

    pub fn verify(&self) -> TesseraResult<()> {
        match self.public_key() {
            Some(_) => Ok(()),
            None => Err(TesseraError::BadSignature),
        }
    }

    /// A message with the same content and another signature.
    ///
    /// The cached content hash carries over, the recovered key does not.
    pub fn with_signature(&self, signature: Signature) -> Self
    where
        T: Clone,
    {
        let message = Self::new(self.content.clone(), signature);
        if let Some(hash) = self.hash.get() {
            let _ = message.hash.set(*hash);
        }
        message
    }

    pub fn into_content(self) -> T {
        self.content
    }
}

impl<T: PartialEq> PartialEq for SignedMessage<T> {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content && self.signature == other.signature
    }
}

impl<T: Eq> Eq for SignedMessage<T> {}

impl<T: fmt::Debug> fmt::Debug for SignedMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedMessage")
            .field("content", &self.content)
            .field("signature", &self.signature)
            .finish()
    }
}
