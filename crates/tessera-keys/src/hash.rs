//! SHA3-256 hashing

use sha3::{Digest, Sha3_256};

pub const HASH_LENGTH: usize = 32;

/// 32-byte digest
pub type Hash = [u8; HASH_LENGTH];

/// SHA3-256 of `data`.
pub fn sha3_256(data: &[u8]) -> Hash {
    Sha3_256::digest(data).into()
}

/// SHA3-256 over several slices, equivalent to hashing their concatenation.
pub fn sha3_256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha3_empty_vector() {
        assert_eq!(
            hex::encode(sha3_256(b"")),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn test_concat_matches_single_pass() {
        assert_eq!(sha3_256_concat(&[b"ab", b"cd"]), sha3_256(b"abcd"));
    }
}
