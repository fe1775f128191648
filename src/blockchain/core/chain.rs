use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::mempool::Mempool;
use crate::miner::valid_proof;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::validation::validate_chain;

pub type Sha256Hash = [u8; 32];

/// Proof stamped on the genesis block. Genesis is never checked against the
/// proof-of-work target.
pub const GENESIS_PROOF: u64 = 100;

/// Wire value standing in for the genesis block's missing predecessor.
pub const GENESIS_PREVIOUS_HASH_SENTINEL: u64 = 1;

/// SHA-256 digest of a block's canonical serialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHash(Sha256Hash);

impl BlockHash {
    pub fn from_bytes(bytes: Sha256Hash) -> Self {
        BlockHash(bytes)
    }

    /// Parse a 64 character lowercase hex digest.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 64 || s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(LedgerError::Serialization(format!(
                "block hash must be 64 lowercase hex characters, got {:?}",
                s
            )));
        }
        let bytes = hex::decode(s).map_err(|e| LedgerError::Serialization(format!("Invalid block hash {:?}: {}", s, e)))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(BlockHash(out))
    }

    pub fn as_bytes(&self) -> &Sha256Hash {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Link from a block to its predecessor.
///
/// On the wire the genesis block carries the integer `1` while every other
/// block carries the predecessor's hex digest, so the two can never be
/// confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousHash {
    Genesis,
    Block(BlockHash),
}

impl PreviousHash {
    pub fn block_hash(&self) -> Option<&BlockHash> {
        match self {
            PreviousHash::Genesis => None,
            PreviousHash::Block(hash) => Some(hash),
        }
    }
}

impl fmt::Display for PreviousHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PreviousHash::Genesis => write!(f, "{}", GENESIS_PREVIOUS_HASH_SENTINEL),
            PreviousHash::Block(hash) => write!(f, "{}", hash),
        }
    }
}

impl Serialize for PreviousHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PreviousHash::Genesis => serializer.serialize_u64(GENESIS_PREVIOUS_HASH_SENTINEL),
            PreviousHash::Block(hash) => hash.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPreviousHash {
    Sentinel(u64),
    Digest(String),
}

impl<'de> Deserialize<'de> for PreviousHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawPreviousHash::deserialize(deserializer)? {
            RawPreviousHash::Sentinel(GENESIS_PREVIOUS_HASH_SENTINEL) => Ok(PreviousHash::Genesis),
            RawPreviousHash::Sentinel(other) => Err(D::Error::custom(format!(
                "unexpected previous_hash sentinel {}, expected {}",
                other, GENESIS_PREVIOUS_HASH_SENTINEL
            ))),
            RawPreviousHash::Digest(s) => BlockHash::from_hex(&s).map(PreviousHash::Block).map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Seconds since the Unix epoch, with sub-second precision.
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: PreviousHash,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == PreviousHash::Genesis
    }

    /// Canonical JSON: keys sorted by name at every level, `", "` between
    /// items, `": "` after keys, and everything outside printable ASCII
    /// written as `\uXXXX` escapes.
    pub fn canonical_json(&self) -> Result<String> {
        if !self.timestamp.is_finite() {
            return Err(LedgerError::Serialization(format!(
                "block {} has a non-finite timestamp ({})",
                self.index, self.timestamp
            )));
        }

        let value = sort_keys(serde_json::to_value(self)?);
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
        value.serialize(&mut serializer)?;
        String::from_utf8(out).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn hash(&self) -> Result<BlockHash> {
        let canonical = self.canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(BlockHash(hasher.finalize().into()))
    }
}

/// Rebuild every object with its keys inserted in sorted order. This holds
/// whether or not serde_json's map keeps insertion order.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

struct CanonicalFormatter;

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    // Quotes, backslashes and control characters never reach here; serde_json
    // escapes those itself.
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units).iter() {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A ledger behind one lock: sealing drains the pool and appends the block
/// without any submission slipping in between.
pub type SharedLedger = Arc<RwLock<Ledger>>;

/// The chain of sealed blocks together with the pool of pending transactions.
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
    mempool: Mempool,
    config: LedgerConfig,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create a ledger holding only the genesis block.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let mut ledger = Ledger {
            blocks: vec![],
            mempool: Mempool::new(),
            config,
        };

        let genesis = Block {
            index: 1,
            timestamp: now_secs(),
            transactions: vec![],
            proof: GENESIS_PROOF,
            previous_hash: PreviousHash::Genesis,
        };
        info!("Sealed genesis block (proof = {})", genesis.proof);
        ledger.blocks.push(genesis);
        ledger
    }

    /// Rebuild a ledger from an externally supplied chain, auditing it first.
    pub fn from_blocks(blocks: Vec<Block>, config: LedgerConfig) -> Result<Self> {
        validate_chain(&blocks)?;
        info!("Imported chain of {} blocks", blocks.len());
        Ok(Ledger {
            blocks,
            mempool: Mempool::new(),
            config,
        })
    }

    pub fn from_json(json: &str, config: LedgerConfig) -> Result<Self> {
        let blocks: Vec<Block> = serde_json::from_str(json)?;
        Self::from_blocks(blocks, config)
    }

    /// The sealed chain as a JSON array of blocks.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.blocks)?)
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(RwLock::new(self))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Queue a transaction and return the index of the block that will seal it.
    pub fn new_transaction(&mut self, sender: impl Into<String>, recipient: impl Into<String>, amount: i64) -> u64 {
        let tx = Transaction::new(sender, recipient, amount);
        debug!("Queued transaction {} -> {} ({})", tx.sender, tx.recipient, tx.amount);
        self.mempool.add_transaction(tx);
        self.blocks.last().map_or(1, |b| b.index + 1)
    }

    /// Seal every pending transaction into a new block stamped with `proof`.
    ///
    /// `previous_hash`, when given, must match the hash of the current last
    /// block. A rejected seal leaves both the chain and the pool untouched.
    pub fn new_block(&mut self, proof: u64, previous_hash: Option<BlockHash>) -> Result<Block> {
        let last = self.last_block()?;
        let expected = last.hash()?;
        let (last_proof, last_timestamp) = (last.proof, last.timestamp);

        if let Some(supplied) = previous_hash {
            if supplied != expected {
                warn!("Rejected seal: previous hash {} does not match last block", supplied);
                return Err(LedgerError::InvalidBlockLinkage {
                    expected: expected.to_hex(),
                    found: supplied.to_hex(),
                });
            }
        }

        if self.config.verify_proofs && !valid_proof(last_proof, proof) {
            warn!("Rejected seal: proof {} is not valid for last proof {}", proof, last_proof);
            return Err(LedgerError::InvalidProof {
                last_proof,
                proof,
            });
        }

        let block = Block {
            index: self.blocks.len() as u64 + 1,
            timestamp: now_secs().max(last_timestamp),
            transactions: self.mempool.drain(),
            proof,
            previous_hash: PreviousHash::Block(expected),
        };

        info!(
            "Sealed block {} with {} transactions (proof = {})",
            block.index,
            block.transactions.len(),
            block.proof
        );
        self.blocks.push(block.clone());
        Ok(block)
    }

    pub fn hash(block: &Block) -> Result<BlockHash> {
        block.hash()
    }

    pub fn last_block(&self) -> Result<&Block> {
        self.blocks.last().ok_or(LedgerError::EmptyChain)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn pending(&self) -> &[Transaction] {
        self.mempool.transactions()
    }

    /// Audit the live chain.
    pub fn validate(&self) -> Result<()> {
        validate_chain(&self.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::find_proof;

    fn fixed_genesis() -> Block {
        Block {
            index: 1,
            timestamp: 1700000000.5,
            transactions: vec![],
            proof: GENESIS_PROOF,
            previous_hash: PreviousHash::Genesis,
        }
    }

    const FIXED_GENESIS_HASH: &str = "34e9b643e6d862c44dc8ecb6771d9988000143a71c54d8939eec051706e03b13";

    #[test]
    fn test_genesis_invariant() {
        let ledger = Ledger::new();
        assert_eq!(ledger.len(), 1);
        let genesis = ledger.last_block().unwrap();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert_eq!(genesis.previous_hash, PreviousHash::Genesis);
        assert!(genesis.transactions.is_empty());
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn test_canonical_json_layout() {
        let json = fixed_genesis().canonical_json().unwrap();
        assert_eq!(
            json,
            r#"{"index": 1, "previous_hash": 1, "proof": 100, "timestamp": 1700000000.5, "transactions": []}"#
        );
    }

    #[test]
    fn test_canonical_json_sorts_nested_transaction_keys() {
        let mut block = fixed_genesis();
        block.transactions.push(Transaction::new("A", "B", 5));
        let json = block.canonical_json().unwrap();
        assert!(json.contains(r#"[{"amount": 5, "recipient": "B", "sender": "A"}]"#));
    }

    #[test]
    fn test_hash_golden_values() {
        let genesis = fixed_genesis();
        assert_eq!(genesis.hash().unwrap().to_hex(), FIXED_GENESIS_HASH);

        let block = Block {
            index: 2,
            timestamp: 1700000001.25,
            transactions: vec![Transaction::new("A", "B", 5), Transaction::new("B", "C", 3)],
            proof: 35293,
            previous_hash: PreviousHash::Block(BlockHash::from_hex(FIXED_GENESIS_HASH).unwrap()),
        };
        assert_eq!(
            block.hash().unwrap().to_hex(),
            "0ee65ca1e09218041ddcc47a4cd6149993585452c140297c5d2f0bf912a5d90a"
        );
    }

    #[test]
    fn test_non_ascii_is_escaped_like_reference() {
        let mut block = fixed_genesis();
        block.transactions.push(Transaction::new("Zo\u{eb}", "\u{1f600}", 5));

        let json = block.canonical_json().unwrap();
        assert!(json.contains(r#"{"amount": 5, "recipient": "\ud83d\ude00", "sender": "Zo\u00eb"}"#));
        assert!(json.is_ascii());
        assert_eq!(
            block.hash().unwrap().to_hex(),
            "d6121b7d931df7c6329d5aecaf549a468500950b6d05fe95ed32e1c06f8051e2"
        );
    }

    #[test]
    fn test_delete_and_control_characters_are_escaped() {
        let mut block = fixed_genesis();
        block.transactions.push(Transaction::new("a\u{7f}b", "c\nd", 1));
        let json = block.canonical_json().unwrap();
        assert!(json.contains(r#""sender": "a\u007fb""#));
        assert!(json.contains(r#""recipient": "c\nd""#));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let block = fixed_genesis();
        assert_eq!(block.hash().unwrap(), block.hash().unwrap());
        assert_eq!(block.hash().unwrap(), block.clone().hash().unwrap());
    }

    #[test]
    fn test_hash_is_sensitive_to_every_field() {
        let mut base = fixed_genesis();
        base.transactions.push(Transaction::new("A", "B", 5));
        let original = base.hash().unwrap();

        let mut changed = base.clone();
        changed.index += 1;
        assert_ne!(changed.hash().unwrap(), original);

        let mut changed = base.clone();
        changed.timestamp += 0.25;
        assert_ne!(changed.hash().unwrap(), original);

        let mut changed = base.clone();
        changed.proof += 1;
        assert_ne!(changed.hash().unwrap(), original);

        let mut changed = base.clone();
        changed.previous_hash = PreviousHash::Block(original);
        assert_ne!(changed.hash().unwrap(), original);

        let mut changed = base.clone();
        changed.transactions[0].amount = 6;
        assert_ne!(changed.hash().unwrap(), original);

        let mut changed = base.clone();
        changed.transactions[0].recipient = "C".to_string();
        assert_ne!(changed.hash().unwrap(), original);
    }

    #[test]
    fn test_non_finite_timestamp_fails_to_hash() {
        let mut block = fixed_genesis();
        block.timestamp = f64::NAN;
        assert!(matches!(block.hash(), Err(LedgerError::Serialization(_))));
        block.timestamp = f64::INFINITY;
        assert!(matches!(block.hash(), Err(LedgerError::Serialization(_))));
    }

    #[test]
    fn test_new_transaction_reports_next_index() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.new_transaction("A", "B", 5), 2);
        assert_eq!(ledger.new_transaction("", "", -1), 2);
        assert_eq!(ledger.pending().len(), 2);
    }

    #[test]
    fn test_seal_drains_pool_and_links_to_genesis() {
        let mut ledger = Ledger::new();
        ledger.new_transaction("A", "B", 5);
        ledger.new_transaction("B", "C", 3);

        let genesis_hash = ledger.last_block().unwrap().hash().unwrap();
        let proof = find_proof(ledger.last_block().unwrap().proof);
        let block = ledger.new_block(proof, None).unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(block.index, 2);
        assert_eq!(block.previous_hash, PreviousHash::Block(genesis_hash));
        assert_eq!(block.transactions, vec![Transaction::new("A", "B", 5), Transaction::new("B", "C", 3)]);
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.last_block().unwrap(), &block);
    }

    #[test]
    fn test_seal_rejects_invalid_proof_and_keeps_pool() {
        let mut ledger = Ledger::new();
        ledger.new_transaction("A", "B", 5);

        let err = ledger.new_block(1, None).unwrap_err();
        assert_eq!(err, LedgerError::InvalidProof { last_proof: GENESIS_PROOF, proof: 1 });
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[test]
    fn test_seal_without_verification_accepts_any_proof() {
        let mut ledger = Ledger::with_config(LedgerConfig { verify_proofs: false });
        let block = ledger.new_block(1, None).unwrap();
        assert_eq!(block.proof, 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_seal_with_supplied_previous_hash() {
        let mut ledger = Ledger::new();
        let genesis_hash = ledger.last_block().unwrap().hash().unwrap();
        let block = ledger.new_block(35293, Some(genesis_hash)).unwrap();
        assert_eq!(block.previous_hash.block_hash(), Some(&genesis_hash));
    }

    #[test]
    fn test_seal_rejects_mismatched_previous_hash() {
        let mut ledger = Ledger::new();
        let bogus = BlockHash::from_bytes([7u8; 32]);
        let err = ledger.new_block(35293, Some(bogus)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidBlockLinkage { .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let mut ledger = Ledger::with_config(LedgerConfig { verify_proofs: false });
        for proof in 0..5 {
            ledger.new_block(proof, None).unwrap();
        }
        for pair in ledger.blocks().windows(2) {
            assert!(pair[1].timestamp >= pair[0].timestamp);
        }
    }

    #[test]
    fn test_previous_hash_wire_shapes() {
        let genesis = serde_json::to_value(PreviousHash::Genesis).unwrap();
        assert_eq!(genesis, serde_json::json!(1));

        let hash = BlockHash::from_hex(FIXED_GENESIS_HASH).unwrap();
        let linked = serde_json::to_value(PreviousHash::Block(hash)).unwrap();
        assert_eq!(linked, serde_json::json!(FIXED_GENESIS_HASH));

        let parsed: PreviousHash = serde_json::from_value(serde_json::json!(1)).unwrap();
        assert_eq!(parsed, PreviousHash::Genesis);
        assert!(serde_json::from_value::<PreviousHash>(serde_json::json!(2)).is_err());
        assert!(serde_json::from_value::<PreviousHash>(serde_json::json!("abc")).is_err());
    }

    #[test]
    fn test_block_hash_rejects_uppercase_and_bad_length() {
        assert!(BlockHash::from_hex(&FIXED_GENESIS_HASH.to_uppercase()).is_err());
        assert!(BlockHash::from_hex("00").is_err());
        assert!(BlockHash::from_hex(&"zz".repeat(32)).is_err());
    }
}
