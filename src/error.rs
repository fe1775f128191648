//! Error types for HashLedger

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    EmptyChain,
    InvalidProof { last_proof: u64, proof: u64 },
    InvalidBlockLinkage { expected: String, found: String },
    InvalidBlock(String),
    Serialization(String),
    Config(String),
    Io(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::EmptyChain => write!(f, "Chain is empty"),
            LedgerError::InvalidProof { last_proof, proof } => write!(
                f,
                "Invalid proof of work: {} does not satisfy the target for last proof {}",
                proof, last_proof
            ),
            LedgerError::InvalidBlockLinkage { expected, found } => write!(
                f,
                "Invalid block linkage: expected previous hash {}, got {}",
                expected, found
            ),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {}", msg),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            LedgerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            LedgerError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
