#![forbid(unsafe_code)]
//! Command-line host for HashLedger

use clap::{Parser, Subcommand};
use colored::*;
use hashledger::blockchain::{Block, Ledger};
use hashledger::config::{load_config, DEFAULT_CONFIG_PATH};
use hashledger::miner::{find_proof, proof_digest, valid_proof, Miner};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hashledger", version, about = "Append-only hash-chained ledger with proof-of-work")]
struct Cli {
    /// Path to the TOML config file (defaults are used when it is absent)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit two transactions, mine them into a block and print the chain
    Demo {
        /// Write the chain JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Mine blocks on a fresh ledger, queueing the given transactions before each one
    Mine {
        #[arg(short, long, default_value_t = 1)]
        blocks: u64,
        /// Transaction as sender:recipient:amount (repeatable)
        #[arg(long = "tx", value_parser = parse_transaction)]
        transactions: Vec<(String, String, i64)>,
        /// Worker threads for the proof search (overrides the config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Write the chain JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Find the smallest proof for a last proof
    Proof { last_proof: u64 },
    /// Check a proof against a last proof
    Verify { last_proof: u64, proof: u64 },
    /// Audit a chain dump written by `demo` or `mine` (stdout or --out)
    Audit { file: PathBuf },
}

fn parse_transaction(s: &str) -> Result<(String, String, i64), String> {
    let mut parts = s.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(sender), Some(recipient), Some(amount)) => {
            let amount = amount
                .parse::<i64>()
                .map_err(|e| format!("invalid amount {:?}: {}", amount, e))?;
            Ok((sender.to_string(), recipient.to_string(), amount))
        }
        _ => Err(format!("expected sender:recipient:amount, got {:?}", s)),
    }
}

// Status output goes to stderr so stdout carries nothing but the chain JSON.
fn print_block(block: &Block) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("{} #{}", "Block".bright_green().bold(), block.index);
    eprintln!("  Hash:          {}", block.hash()?.to_string().bright_white());
    eprintln!("  Previous:      {}", block.previous_hash);
    eprintln!("  Proof:         {}", block.proof);
    eprintln!("  Timestamp:     {:.6}", block.timestamp);
    eprintln!("  Transactions:  {}", block.transactions.len());
    for tx in &block.transactions {
        eprintln!("    {} -> {} : {}", tx.sender, tx.recipient, tx.amount);
    }
    Ok(())
}

fn write_chain(ledger: &Ledger, out: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let json = ledger.to_json()?;
    match out {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("Chain written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Demo { out } => {
            let mut ledger = Ledger::with_config(config.ledger.clone());
            let next = ledger.new_transaction("A", "B", 5);
            ledger.new_transaction("B", "C", 3);
            eprintln!("{} transactions queued for block {}", "2".bright_cyan(), next);

            let proof = find_proof(ledger.last_block()?.proof);
            let block = ledger.new_block(proof, None)?;
            print_block(&block)?;

            ledger.validate()?;
            eprintln!("{}", "Chain verified".bright_green());
            write_chain(&ledger, out.as_deref())?;
        }
        Command::Mine {
            blocks,
            transactions,
            workers,
            out,
        } => {
            let miner = Miner::new(workers.unwrap_or(config.miner.workers))?;
            let ledger = Ledger::with_config(config.ledger.clone()).into_shared();
            let cancel = AtomicBool::new(false);
            let started = Instant::now();

            for _ in 0..blocks {
                {
                    let mut guard = ledger.write();
                    for (sender, recipient, amount) in &transactions {
                        guard.new_transaction(sender.as_str(), recipient.as_str(), *amount);
                    }
                }
                if let Some(block) = miner.mine(&ledger, &cancel)? {
                    print_block(&block)?;
                }
            }

            let guard = ledger.read();
            guard.validate()?;
            eprintln!(
                "{} {} blocks in {:.3}s with {} worker(s)",
                "Mined".bright_green().bold(),
                blocks,
                started.elapsed().as_secs_f64(),
                miner.workers()
            );
            write_chain(&guard, out.as_deref())?;
        }
        Command::Proof { last_proof } => {
            let started = Instant::now();
            let proof = find_proof(last_proof);
            println!("Proof:   {}", proof.to_string().bright_green().bold());
            println!("Digest:  {}", proof_digest(last_proof, proof));
            println!("Elapsed: {:.3}s", started.elapsed().as_secs_f64());
        }
        Command::Verify { last_proof, proof } => {
            println!("Digest:  {}", proof_digest(last_proof, proof));
            if valid_proof(last_proof, proof) {
                println!("{}", "Valid proof".bright_green().bold());
            } else {
                println!("{}", "Invalid proof".bright_red().bold());
                std::process::exit(1);
            }
        }
        Command::Audit { file } => {
            let json = fs::read_to_string(&file)?;
            match Ledger::from_json(&json, config.ledger.clone()) {
                Ok(ledger) => println!(
                    "{} {} blocks, last hash {}",
                    "Chain valid:".bright_green().bold(),
                    ledger.len(),
                    ledger.last_block()?.hash()?
                ),
                Err(e) => {
                    println!("{} {}", "Chain invalid:".bright_red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
