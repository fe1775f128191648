/// Transaction types for HashLedger
use serde::{Deserialize, Serialize};

/// An opaque value-transfer record.
///
/// The ledger only orders and hash-chains these; it never checks balances or
/// signatures, so any sender, recipient or amount (including empty strings,
/// zero and negative amounts) is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: i64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: i64) -> Self {
        Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }
}
