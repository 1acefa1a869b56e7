// Thin re-export module: the ledger core lives in `blockchain/core.rs`, split
// into hashing, block/store management and validation.

pub mod core;
pub use core::*;
