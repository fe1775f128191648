//! HashLedger - an append-only, hash-chained ledger gated by proof-of-work
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, canonical hashing, the [`blockchain::Ledger`] and chain audits
//! - [`transaction`] - Transaction records
//! - [`mempool`] - Pending pool of unsealed transactions
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work search, verification and the mine operation
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
