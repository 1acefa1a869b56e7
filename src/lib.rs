//! bpmchain - a hash-chained ledger of heart-rate readings
//!
//! # Architecture
//!
//! ## Ledger Core
//! - [`blockchain`] - Blocks, hashing, validation and the chain store
//! - [`miner`] - Block production and proof-of-work search
//! - [`consensus`] - Longest-chain fork choice
//!
//! ## Orchestration
//! - [`node`] - Producers, chain events and shutdown
//!
//! ## Interfaces
//! - [`network`] - Line-delimited TCP streaming interface
//! - [`api`] - HTTP request/response interface
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger Core
// ============================================================================
pub mod blockchain;
pub mod consensus;
pub mod miner;

// ============================================================================
// Orchestration
// ============================================================================
pub mod node;

// ============================================================================
// Interfaces
// ============================================================================
pub mod network;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
