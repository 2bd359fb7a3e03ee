//! Content hashing of selected payload regions.
//!
//! # Overview
//!
//! [`ContentHasher`] turns one or more byte regions into a fixed-length,
//! lowercase hexadecimal digest. Regions are fed to a single incremental
//! hasher in order, so hashing `[a, b]` is identical to hashing `a ++ b`.
//! The digest depends on the bytes alone, never on path or metadata.
//!
//! Two 256-bit algorithms are available: BLAKE3 (the default) and SHA-256.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Hash function used for content digests.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3, 256-bit output
    #[default]
    Blake3,
    /// SHA-256
    Sha256,
}

impl HashAlgorithm {
    /// Length of a digest in hex characters.
    pub const HEX_LEN: usize = 64;
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => write!(f, "blake3"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Stateless digest calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
}

impl ContentHasher {
    /// Create a hasher using `algorithm`.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// The configured algorithm.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest a single region.
    ///
    /// # Example
    ///
    /// ```
    /// use dicomdupe::scanner::{ContentHasher, HashAlgorithm};
    ///
    /// let hasher = ContentHasher::new(HashAlgorithm::Sha256);
    /// assert_eq!(
    ///     hasher.digest(b"abc"),
    ///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    /// );
    /// ```
    #[must_use]
    pub fn digest(&self, bytes: &[u8]) -> String {
        self.digest_regions(&[bytes])
    }

    /// Digest the concatenation of `regions`, in order.
    #[must_use]
    pub fn digest_regions(&self, regions: &[&[u8]]) -> String {
        match self.algorithm {
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                for region in regions {
                    hasher.update(region);
                }
                hasher.finalize().to_hex().to_string()
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = sha2::Sha256::new();
                for region in regions {
                    hasher.update(region);
                }
                to_hex(&hasher.finalize())
            }
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        let blake = ContentHasher::new(HashAlgorithm::Blake3);
        assert_eq!(
            blake.digest(b""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );

        let sha = ContentHasher::new(HashAlgorithm::Sha256);
        assert_eq!(
            sha.digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_is_fixed_length_lowercase_hex() {
        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            let digest = ContentHasher::new(algorithm).digest(b"pixel data");
            assert_eq!(digest.len(), HashAlgorithm::HEX_LEN);
            assert!(digest
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn test_regions_equal_concatenation() {
        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            let hasher = ContentHasher::new(algorithm);
            assert_eq!(
                hasher.digest_regions(&[b"roi", b"contour", b"obs"]),
                hasher.digest(b"roicontourobs")
            );
        }
    }

    #[test]
    fn test_region_order_matters() {
        let hasher = ContentHasher::default();
        assert_ne!(
            hasher.digest_regions(&[b"first", b"second"]),
            hasher.digest_regions(&[b"second", b"first"])
        );
    }

    #[test]
    fn test_algorithms_differ() {
        let data = b"same bytes";
        assert_ne!(
            ContentHasher::new(HashAlgorithm::Blake3).digest(data),
            ContentHasher::new(HashAlgorithm::Sha256).digest(data)
        );
    }

    #[test]
    fn test_algorithm_serde_names() {
        assert_eq!(
            serde_json::to_string(&HashAlgorithm::Sha256).unwrap(),
            "\"sha256\""
        );
        let parsed: HashAlgorithm = serde_json::from_str("\"blake3\"").unwrap();
        assert_eq!(parsed, HashAlgorithm::Blake3);
        assert_eq!(HashAlgorithm::default().to_string(), "blake3");
    }
}
