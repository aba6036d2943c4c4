//! SHA-256 content hash.
//!
//! Equal digests are treated as proof that two files hold the same bytes.

use crate::core::hasher::traits::{Computed, HashInput, HashMethod, HashSubject};
use crate::error::HashError;
use sha2::{Digest, Sha256};

/// Cryptographic digest of the raw file content
#[derive(Debug, Default)]
pub struct Sha256Hash;

impl Sha256Hash {
    pub const KEY: &'static str = "SHA256";

    pub fn new() -> Self {
        Self
    }

    /// Lower-case hex digest of `bytes`
    pub fn digest(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }
}

impl HashMethod for Sha256Hash {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn input_kind(&self) -> HashInput {
        HashInput::Bytes
    }

    fn compute(&mut self, subject: HashSubject<'_>) -> Result<Computed, HashError> {
        match subject {
            HashSubject::Bytes(bytes) => Ok(Computed::Supported(Self::digest(bytes))),
            HashSubject::Image(_) => Ok(Computed::Unsupported),
        }
    }

    fn compare(&self, a: &str, b: &str) -> f64 {
        if !a.is_empty() && a.eq_ignore_ascii_case(b) {
            1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(bytes: &[u8]) -> String {
        match Sha256Hash::new().compute(HashSubject::Bytes(bytes)).unwrap() {
            Computed::Supported(value) => value,
            Computed::Unsupported => panic!("bytes must be supported"),
        }
    }

    #[test]
    fn digest_matches_known_vector() {
        assert_eq!(
            hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_is_deterministic() {
        let bytes = vec![7u8; 4096];
        assert_eq!(hash(&bytes), hash(&bytes));
    }

    #[test]
    fn single_byte_change_changes_digest() {
        let original = vec![0u8; 1024];
        for index in [0, 511, 1023] {
            let mut changed = original.clone();
            changed[index] = 1;
            assert_ne!(hash(&original), hash(&changed));
        }
    }

    #[test]
    fn compare_is_exact_match_only() {
        let method = Sha256Hash::new();
        let a = hash(b"a");
        let b = hash(b"b");
        assert_eq!(method.compare(&a, &a), 1.0);
        assert_eq!(method.compare(&a, &b), 0.0);
        assert_eq!(method.compare(&a, &b), method.compare(&b, &a));
    }

    #[test]
    fn image_input_is_unsupported() {
        use crate::core::hasher::algorithms::test_support::{checker, normalize};
        let image = normalize(&checker(16, 16));
        let outcome = Sha256Hash::new().compute(HashSubject::Image(&image)).unwrap();
        assert_eq!(outcome, Computed::Unsupported);
    }
}
