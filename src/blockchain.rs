// Thin re-export module: implementation is in `blockchain/core.rs`, split
// into the chain/ledger data model and chain-integrity validation.

pub mod core;
pub use core::*;
