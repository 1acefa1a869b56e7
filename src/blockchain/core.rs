// core.rs splits the ledger into hashing, chain storage and validation.
pub mod chain;
pub mod hash;
pub mod validation;

pub use chain::*;
pub use hash::*;
pub use validation::*;
