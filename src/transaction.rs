//! Transaction records carried by the pending pool and sealed blocks

pub mod types;

pub use types::*;
