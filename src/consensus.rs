use crate::blockchain::{check_structure, validate_chain, Block, ChainParams};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};

/// Rule applied when a competing chain arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForkChoice {
    /// Adopt any strictly longer chain that starts at a genesis block and
    /// numbers its blocks without gaps. Hashes and links are not checked.
    Longest,
    /// Adopt a strictly longer chain only if it starts at our genesis and
    /// every link validates.
    #[default]
    LongestValid,
}

/// What fork choice did with a candidate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ForkOutcome {
    Replaced { previous_len: usize, new_len: usize },
    Kept { local_len: usize, candidate_len: usize },
}

impl ForkOutcome {
    pub fn replaced(&self) -> bool {
        matches!(self, ForkOutcome::Replaced { .. })
    }

    /// Length of the authoritative chain after the decision.
    pub fn resulting_len(&self) -> usize {
        match self {
            ForkOutcome::Replaced { new_len, .. } => *new_len,
            ForkOutcome::Kept { local_len, .. } => *local_len,
        }
    }
}

/// Fork-choice engine
pub struct Consensus;

impl Consensus {
    /// Reject a candidate the rule refuses to consider at all.
    ///
    /// Runs without the store lock; only looks at the candidate itself.
    pub fn vet_candidate(
        rule: ForkChoice,
        candidate: &[Block],
        genesis: &Block,
        params: &ChainParams,
    ) -> Result<(), ChainError> {
        match rule {
            ForkChoice::Longest => check_structure(candidate),
            ForkChoice::LongestValid => validate_chain(candidate, genesis, params),
        }
    }

    /// Longest chain wins; ties keep the local chain.
    pub fn prefers(candidate_len: usize, local_len: usize) -> bool {
        candidate_len > local_len
    }
}
