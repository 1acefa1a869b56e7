//! Block production: builds a child of the tip and, when a difficulty is set,
//! searches for a nonce whose hash carries enough leading zero hex digits.
//!
//! The search is expected to take `16^difficulty` attempts. Nothing caps it
//! except the caller's [`MiningControl`], so operators pick difficulty with
//! wall-clock cost in mind.

use crate::blockchain::{meets_difficulty, Block, HashAlgorithm};
use crate::error::ChainError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How many hashes are tried between cancellation and deadline checks.
pub const CONTROL_CHECK_INTERVAL: u64 = 1024;

/// Shared flag used to abort in-flight searches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits applied to a proof-of-work search.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl MiningControl {
    /// No deadline and a token nobody else holds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(cancel: CancelToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    fn check(&self, attempts: u64) -> Result<(), ChainError> {
        if self.cancel.is_cancelled() {
            return Err(ChainError::MiningCancelled { attempts });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ChainError::MiningTimedOut { attempts });
        }
        Ok(())
    }
}

/// A sealed block together with what it cost to find.
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Search nonces from 0 upward until the hash meets `difficulty`.
///
/// Difficulty 0 accepts the first attempt (nonce "0").
pub fn mine_block(
    mut block: Block,
    difficulty: u32,
    algorithm: HashAlgorithm,
    control: &MiningControl,
) -> Result<MinedBlock, ChainError> {
    let start = Instant::now();
    block.difficulty = Some(difficulty);

    let mut nonce: u64 = 0;
    loop {
        block.nonce = Some(nonce.to_string());
        let hash = block.computed_hash(algorithm);
        let attempts = nonce + 1;

        if meets_difficulty(&hash, difficulty) {
            block.hash = hash;
            return Ok(MinedBlock {
                block,
                attempts,
                elapsed: start.elapsed(),
            });
        }

        if attempts % CONTROL_CHECK_INTERVAL == 0 {
            control.check(attempts)?;
        }
        nonce = nonce.checked_add(1).ok_or(ChainError::NonceExhausted)?;
    }
}

/// Build the child of `parent` carrying `payload`.
///
/// Without a difficulty the block is hashed once; with one, the nonce search
/// runs under `control`. The chain store is never touched here.
pub fn create_block(
    parent: &Block,
    payload: u64,
    difficulty: Option<u32>,
    algorithm: HashAlgorithm,
    control: &MiningControl,
) -> Result<Block, ChainError> {
    let candidate = Block::next(parent, payload)?;
    match difficulty {
        None => Ok(candidate.seal(algorithm)),
        Some(difficulty) => mine_block(candidate, difficulty, algorithm, control).map(|mined| mined.block),
    }
}
