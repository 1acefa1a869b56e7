//! Error types for bpmchain

use crate::blockchain::Rejection;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(Rejection),
    #[error("Invalid chain at position {position}: {reason}")]
    InvalidChain { position: usize, reason: Rejection },
    #[error("Invalid genesis block: {0}")]
    InvalidGenesis(String),
    #[error("Mining cancelled after {attempts} attempts")]
    MiningCancelled { attempts: u64 },
    #[error("Mining deadline exceeded after {attempts} attempts")]
    MiningTimedOut { attempts: u64 },
    #[error("Nonce space exhausted")]
    NonceExhausted,
    #[error("Block index overflow: no index follows {parent}")]
    IndexOverflow { parent: u64 },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Whether the error means the block was refused by the validator,
    /// as opposed to never having been produced.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ChainError::InvalidBlock(_) | ChainError::InvalidChain { .. } | ChainError::InvalidGenesis(_)
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

impl From<Rejection> for ChainError {
    fn from(reason: Rejection) -> Self {
        ChainError::InvalidBlock(reason)
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
