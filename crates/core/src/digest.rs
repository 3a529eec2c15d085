//! Digest algorithms usable for the signed byte ranges.

use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};

/// Supported digest algorithms.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Returns the algorithm name in lowercase.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse algorithm from name string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Some(DigestAlgorithm::Sha256),
            "sha384" | "sha-384" => Some(DigestAlgorithm::Sha384),
            "sha512" | "sha-512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Output length in bytes for this algorithm.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Lowest document version, as `major * 10 + minor`, that permits
    /// this digest in a signature.
    pub fn min_pdf_version(&self) -> u8 {
        match self {
            DigestAlgorithm::Sha256 => 16,
            DigestAlgorithm::Sha384 | DigestAlgorithm::Sha512 => 17,
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unsupported digest algorithm: {s}"))
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn hash_ranges<D: sha2::Digest>(ranges: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for range in ranges {
        hasher.update(range);
    }
    hasher.finalize().to_vec()
}

/// Computes the digest over the concatenation of `ranges` without copying them.
#[tracing::instrument(skip(ranges), fields(ranges = ranges.len(), alg = ?algorithm))]
pub fn compute_digest(algorithm: DigestAlgorithm, ranges: &[&[u8]]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha256 => hash_ranges::<Sha256>(ranges),
        DigestAlgorithm::Sha384 => hash_ranges::<Sha384>(ranges),
        DigestAlgorithm::Sha512 => hash_ranges::<Sha512>(ranges),
    }
}
