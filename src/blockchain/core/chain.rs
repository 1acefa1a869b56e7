use crate::consensus::{Consensus, ForkChoice, ForkOutcome};
use crate::error::ChainError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::hash::{hash_block, HashAlgorithm};
use super::validation::check_block;

/// Fixed genesis timestamp so every node of a deployment derives the same genesis hash.
pub const GENESIS_TIMESTAMP: &str = "1970-01-01T00:00:00+00:00";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// RFC3339 creation time. Informational only.
    pub timestamp: String,
    /// The recorded reading (beats per minute).
    #[serde(alias = "bpm", alias = "BPM")]
    pub payload: u64,
    /// Hash of the parent block, empty for genesis.
    pub prev_hash: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// An ordered sequence of blocks starting at genesis.
pub type Chain = Vec<Block>;

impl Block {
    pub fn genesis(algorithm: HashAlgorithm) -> Self {
        Block {
            index: 0,
            timestamp: GENESIS_TIMESTAMP.to_string(),
            payload: 0,
            prev_hash: String::new(),
            hash: String::new(),
            difficulty: None,
            nonce: None,
        }
        .seal(algorithm)
    }

    /// An unsealed child of `parent` carrying `payload`, stamped with the current time.
    ///
    /// Fails when `parent` already sits at the largest representable index.
    pub fn next(parent: &Block, payload: u64) -> Result<Self, ChainError> {
        let index = parent
            .index
            .checked_add(1)
            .ok_or(ChainError::IndexOverflow { parent: parent.index })?;
        Ok(Block {
            index,
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
            prev_hash: parent.hash.clone(),
            hash: String::new(),
            difficulty: None,
            nonce: None,
        })
    }

    /// Fill in `hash` from the block's own fields.
    pub fn seal(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash = self.computed_hash(algorithm);
        self
    }

    pub fn computed_hash(&self, algorithm: HashAlgorithm) -> String {
        hash_block(self, algorithm)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash.is_empty()
    }
}

/// Deployment-wide parameters every block is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainParams {
    pub algorithm: HashAlgorithm,
    /// Required leading zero hex characters; 0 disables proof-of-work.
    pub difficulty: u32,
}

impl ChainParams {
    pub fn new(algorithm: HashAlgorithm, difficulty: u32) -> Self {
        Self { algorithm, difficulty }
    }

    /// The difficulty new blocks are mined at, `None` when proof-of-work is off.
    pub fn difficulty_target(&self) -> Option<u32> {
        (self.difficulty > 0).then_some(self.difficulty)
    }
}

/// The authoritative in-memory chain.
///
/// All reads hand out copies. Append and replacement run inside a single
/// write-locked section each, so a producer can never extend a tip that
/// another producer already extended, and snapshot readers never see a
/// half-applied mutation.
pub struct ChainStore {
    blocks: RwLock<Chain>,
    genesis: Block,
    params: ChainParams,
}

impl ChainStore {
    /// Create a store holding only the genesis block.
    pub fn new(params: ChainParams) -> Self {
        let genesis = Block::genesis(params.algorithm);
        Self {
            blocks: RwLock::new(vec![genesis.clone()]),
            genesis,
            params,
        }
    }

    pub fn params(&self) -> ChainParams {
        self.params
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    /// Copy of the current last block.
    pub fn tip(&self) -> Block {
        tip_of(&self.blocks.read()).clone()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// Always false: the chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Copy of the full sequence.
    pub fn snapshot(&self) -> Chain {
        self.blocks.read().clone()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        let index = usize::try_from(index).ok()?;
        self.blocks.read().get(index).cloned()
    }

    /// Append `block` if it extends the current tip, reporting why it was refused otherwise.
    pub fn try_append(&self, block: Block) -> Result<(), ChainError> {
        let mut blocks = self.blocks.write();
        check_block(&block, tip_of(&blocks), &self.params)?;
        blocks.push(block);
        Ok(())
    }

    /// Append `block` if it extends the current tip. The chain is unchanged on `false`.
    pub fn append(&self, block: Block) -> bool {
        self.try_append(block).is_ok()
    }

    /// Run fork choice against `candidate`, adopting it only if strictly longer.
    ///
    /// Candidate vetting happens before the lock is taken; the length
    /// comparison and swap happen under one write lock.
    pub fn consider_replacement(&self, candidate: Chain, rule: ForkChoice) -> Result<ForkOutcome, ChainError> {
        Consensus::vet_candidate(rule, &candidate, &self.genesis, &self.params)?;

        let mut blocks = self.blocks.write();
        let local_len = blocks.len();
        let candidate_len = candidate.len();
        if Consensus::prefers(candidate_len, local_len) {
            *blocks = candidate;
            Ok(ForkOutcome::Replaced {
                previous_len: local_len,
                new_len: candidate_len,
            })
        } else {
            Ok(ForkOutcome::Kept {
                local_len,
                candidate_len,
            })
        }
    }
}

fn tip_of(blocks: &[Block]) -> &Block {
    blocks.last().expect("chain always holds its genesis block")
}
