use crate::error::{LedgerError, Result};
use crate::miner::valid_proof;

use super::chain::{Block, PreviousHash, GENESIS_PROOF};

/// Audit a whole chain: genesis first, then every block correctly indexed,
/// hash-linked to its predecessor, carrying a valid proof and a timestamp no
/// earlier than the one before it.
pub fn validate_chain(blocks: &[Block]) -> Result<()> {
    let genesis = blocks.first().ok_or(LedgerError::EmptyChain)?;
    if genesis.index != 1 || !genesis.is_genesis() {
        return Err(LedgerError::InvalidBlock(format!(
            "Chain must start with a genesis block at index 1, found index {} with previous hash {}.",
            genesis.index, genesis.previous_hash
        )));
    }
    if genesis.proof != GENESIS_PROOF {
        return Err(LedgerError::InvalidBlock(format!(
            "Genesis block proof must be {}, found {}.",
            GENESIS_PROOF, genesis.proof
        )));
    }
    if !genesis.transactions.is_empty() {
        return Err(LedgerError::InvalidBlock(format!(
            "Genesis block must not carry transactions, found {}.",
            genesis.transactions.len()
        )));
    }
    if !genesis.timestamp.is_finite() {
        return Err(LedgerError::InvalidBlock("Genesis block has a non-finite timestamp.".to_string()));
    }

    for pair in blocks.windows(2) {
        validate_successor(&pair[0], &pair[1])?;
    }
    Ok(())
}

/// Check that `block` may directly follow `prev`.
pub fn validate_successor(prev: &Block, block: &Block) -> Result<()> {
    if block.index != prev.index + 1 {
        return Err(LedgerError::InvalidBlock(format!(
            "Invalid block index. Expected {}, but got {}.",
            prev.index + 1,
            block.index
        )));
    }

    let expected = prev.hash()?;
    match block.previous_hash {
        PreviousHash::Block(found) if found == expected => {}
        found => {
            return Err(LedgerError::InvalidBlockLinkage {
                expected: expected.to_hex(),
                found: found.to_string(),
            })
        }
    }

    if !valid_proof(prev.proof, block.proof) {
        return Err(LedgerError::InvalidProof {
            last_proof: prev.proof,
            proof: block.proof,
        });
    }

    if !block.timestamp.is_finite() || block.timestamp < prev.timestamp {
        return Err(LedgerError::InvalidBlock(format!(
            "Block {} timestamp {} precedes its predecessor's {}.",
            block.index, block.timestamp, prev.timestamp
        )));
    }

    Ok(())
}
