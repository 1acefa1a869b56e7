use crate::error::ChainError;
use thiserror::Error;

use super::chain::{Block, ChainParams};
use super::hash::{leading_zero_digits, HashAlgorithm};

/// The first check a candidate block failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("expected index {expected}, got {found}")]
    IndexMismatch { expected: u64, found: u64 },
    #[error("previous hash mismatch: expected {expected}, got {found}")]
    PrevHashMismatch { expected: String, found: String },
    #[error("hash mismatch: computed {computed}, stored {stored}")]
    HashMismatch { computed: String, stored: String },
    #[error("declared difficulty {found} is below the required {required}")]
    DifficultyBelowTarget { required: u32, found: u32 },
    #[error("hash has {found} leading zeros, difficulty requires {required}")]
    InsufficientWork { required: u32, found: usize },
}

/// Check that `candidate` extends `parent`, in order: index, previous hash,
/// self-consistent hash, then proof-of-work.
pub fn check_block(candidate: &Block, parent: &Block, params: &ChainParams) -> Result<(), Rejection> {
    let expected = parent.index.checked_add(1);
    if expected != Some(candidate.index) {
        return Err(Rejection::IndexMismatch {
            expected: expected.unwrap_or(u64::MAX),
            found: candidate.index,
        });
    }

    if candidate.prev_hash != parent.hash {
        return Err(Rejection::PrevHashMismatch {
            expected: parent.hash.clone(),
            found: candidate.prev_hash.clone(),
        });
    }

    check_self_hash(candidate, params.algorithm)?;
    check_work(candidate, params)
}

/// Boolean form of [`check_block`].
pub fn is_block_valid(candidate: &Block, parent: &Block, params: &ChainParams) -> bool {
    check_block(candidate, parent, params).is_ok()
}

fn check_self_hash(block: &Block, algorithm: HashAlgorithm) -> Result<(), Rejection> {
    let computed = block.computed_hash(algorithm);
    if computed != block.hash {
        return Err(Rejection::HashMismatch {
            computed,
            stored: block.hash.clone(),
        });
    }
    Ok(())
}

fn check_work(block: &Block, params: &ChainParams) -> Result<(), Rejection> {
    let declared = block.difficulty.unwrap_or(0);
    if declared < params.difficulty {
        return Err(Rejection::DifficultyBelowTarget {
            required: params.difficulty,
            found: declared,
        });
    }

    let zeros = leading_zero_digits(&block.hash);
    if zeros < declared as usize {
        return Err(Rejection::InsufficientWork {
            required: declared,
            found: zeros,
        });
    }
    Ok(())
}

fn genesis_of(chain: &[Block]) -> Result<&Block, ChainError> {
    let first = chain
        .first()
        .ok_or_else(|| ChainError::InvalidGenesis("chain is empty".to_string()))?;

    if !first.is_genesis() {
        return Err(ChainError::InvalidGenesis(format!(
            "first block has index {} and previous hash {:?}",
            first.index, first.prev_hash
        )));
    }
    Ok(first)
}

/// Shape-only check: the chain starts with a genesis block and its indices
/// run 0, 1, 2, ... without gaps. Hashes and links are not inspected.
pub fn check_structure(chain: &[Block]) -> Result<(), ChainError> {
    genesis_of(chain)?;
    for (position, block) in chain.iter().enumerate().skip(1) {
        let expected = position as u64;
        if block.index != expected {
            return Err(ChainError::InvalidChain {
                position,
                reason: Rejection::IndexMismatch {
                    expected,
                    found: block.index,
                },
            });
        }
    }
    Ok(())
}

/// Validate a whole chain: `genesis` must match exactly, and every adjacent
/// pair must pass [`check_block`].
pub fn validate_chain(chain: &[Block], genesis: &Block, params: &ChainParams) -> Result<(), ChainError> {
    let first = genesis_of(chain)?;
    if first != genesis {
        return Err(ChainError::InvalidGenesis(format!(
            "genesis hash {} does not match local genesis {}",
            first.hash, genesis.hash
        )));
    }

    for (position, pair) in chain.windows(2).enumerate() {
        check_block(&pair[1], &pair[0], params).map_err(|reason| ChainError::InvalidChain {
            position: position + 1,
            reason,
        })?;
    }
    Ok(())
}
