//! Proof-of-work search and verification
//!
//! A proof is admitted when SHA-256 over the decimal digits of the last
//! proof followed directly by the candidate's digits starts with four hex
//! zeros. The search always yields the smallest such candidate, whichever
//! variant runs it.

use crate::blockchain::{Block, SharedLedger};
use crate::error::{LedgerError, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Required prefix of the hex-encoded digest.
pub const DIFFICULTY_PREFIX: &str = "0000";

/// Candidates each worker checks per window in the parallel search.
const WINDOW_PER_WORKER: u64 = 4_096;

/// How often the serial search polls its cancel flag.
const CANCEL_POLL_INTERVAL: u64 = 1_024;

pub fn proof_digest(last_proof: u64, proof: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}{}", last_proof, proof).as_bytes());
    hex::encode(hasher.finalize())
}

pub fn valid_proof(last_proof: u64, proof: u64) -> bool {
    proof_digest(last_proof, proof).starts_with(DIFFICULTY_PREFIX)
}

/// Smallest non-negative proof that is valid for `last_proof`. Blocks until
/// one is found.
pub fn find_proof(last_proof: u64) -> u64 {
    let mut proof = 0;
    while !valid_proof(last_proof, proof) {
        proof += 1;
    }
    proof
}

/// Same search as [`find_proof`], giving up with `None` once `cancel` is set.
pub fn find_proof_cancellable(last_proof: u64, cancel: &AtomicBool) -> Option<u64> {
    let mut proof = 0;
    loop {
        if proof % CANCEL_POLL_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return None;
        }
        if valid_proof(last_proof, proof) {
            return Some(proof);
        }
        proof += 1;
    }
}

/// Upper bound on proof-search worker threads.
pub const MAX_WORKERS: usize = 256;

/// Proof searcher owning its worker pool, so repeated mining reuses threads.
pub struct Miner {
    workers: usize,
    pool: rayon::ThreadPool,
}

impl Miner {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(LedgerError::Config(format!(
                "miner workers must be between 1 and {}, got {}",
                MAX_WORKERS, workers
            )));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| LedgerError::Config(format!("Failed to build miner thread pool: {}", e)))?;
        Ok(Miner { workers, pool })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Smallest valid proof for `last_proof`, or `None` once `cancel` is set.
    pub fn find_proof(&self, last_proof: u64, cancel: &AtomicBool) -> Option<u64> {
        if self.workers == 1 {
            return find_proof_cancellable(last_proof, cancel);
        }

        let window = WINDOW_PER_WORKER.saturating_mul(self.workers as u64);
        self.pool.install(|| {
            let mut start = 0u64;
            loop {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let end = start.saturating_add(window);
                let found = (start..end)
                    .into_par_iter()
                    .find_first(|&proof| valid_proof(last_proof, proof));
                if found.is_some() || end == u64::MAX {
                    return found;
                }
                start = end;
            }
        })
    }

    /// Mine one block: search for the next proof without holding the ledger
    /// lock, then seal every pending transaction with it.
    ///
    /// Returns `Ok(None)` if `cancel` was raised before a proof turned up.
    pub fn mine(&self, ledger: &SharedLedger, cancel: &AtomicBool) -> Result<Option<Block>> {
        let (last_index, last_proof) = {
            let guard = ledger.read();
            let last = guard.last_block()?;
            (last.index, last.proof)
        };

        debug!("Searching for proof after block {} (last proof = {})", last_index, last_proof);
        let started = Instant::now();
        let Some(proof) = self.find_proof(last_proof, cancel) else {
            info!("Mining cancelled after {:.3}s", started.elapsed().as_secs_f64());
            return Ok(None);
        };

        let block = seal_on(ledger, last_index, proof)?;
        info!(
            "Mined block {} in {:.3}s (proof = {})",
            block.index,
            started.elapsed().as_secs_f64(),
            proof
        );
        Ok(Some(block))
    }
}

/// Seal with `proof` only if block `last_index` is still the chain tip.
fn seal_on(ledger: &SharedLedger, last_index: u64, proof: u64) -> Result<Block> {
    let mut guard = ledger.write();
    let current = guard.last_block()?.index;
    if current != last_index {
        warn!("Chain advanced to block {} while mining on block {}", current, last_index);
        return Err(LedgerError::InvalidBlock(format!(
            "Stale proof: chain advanced to block {} while mining on block {}.",
            current, last_index
        )));
    }
    guard.new_block(proof, None)
}

/// Search consecutive windows of candidates on `workers` threads.
///
/// Each window is scanned with `find_first`, so the result is the smallest
/// valid proof, identical to [`find_proof`]. `cancel` is checked between
/// windows.
pub fn find_proof_parallel(last_proof: u64, workers: usize, cancel: &AtomicBool) -> Result<Option<u64>> {
    Ok(Miner::new(workers)?.find_proof(last_proof, cancel))
}

/// One-shot [`Miner::mine`] with a pool of `workers` threads.
pub fn mine(ledger: &SharedLedger, cancel: &AtomicBool, workers: usize) -> Result<Option<Block>> {
    Miner::new(workers)?.mine(ledger, cancel)
}
