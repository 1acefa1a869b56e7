use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use super::chain::Block;

/// Digest function used for every block of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Number of hex characters in a digest, which caps the usable difficulty.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Hash the concatenation of `parts` and return lowercase hex.
    pub fn digest(&self, parts: &[&[u8]]) -> String {
        match self {
            HashAlgorithm::Sha256 => digest_parts::<Sha256>(parts),
            HashAlgorithm::Sha512 => digest_parts::<Sha512>(parts),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> String {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Compute a block hash from its canonical fields.
/// Included, in order: index, timestamp, payload, prev_hash, nonce (if any).
/// `difficulty` and `hash` itself are not part of the digest.
pub fn hash_block(block: &Block, algorithm: HashAlgorithm) -> String {
    let index = block.index.to_string();
    let payload = block.payload.to_string();
    let mut parts: Vec<&[u8]> = vec![
        index.as_bytes(),
        block.timestamp.as_bytes(),
        payload.as_bytes(),
        block.prev_hash.as_bytes(),
    ];
    if let Some(nonce) = &block.nonce {
        parts.push(nonce.as_bytes());
    }
    algorithm.digest(&parts)
}

/// Count the leading `'0'` characters of a hex digest.
pub fn leading_zero_digits(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_digits(hash) >= difficulty as usize
}
