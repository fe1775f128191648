// core.rs splits the ledger into the chain itself and its audit rules.
pub mod chain;
pub mod validation;

pub use chain::*;
pub use validation::*;
