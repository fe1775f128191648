//! Concurrency tests: submissions racing a background miner must never be
//! dropped or sealed twice.

use hashledger::blockchain::Ledger;
use hashledger::miner::mine;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

#[test]
fn test_submissions_during_mining_are_sealed_exactly_once() {
    let ledger = Ledger::new().into_shared();
    let cancel = Arc::new(AtomicBool::new(false));

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    ledger.write().new_transaction(format!("t{}", t), "sink", i);
                }
            })
        })
        .collect();

    let miner = {
        let ledger = ledger.clone();
        let cancel = cancel.clone();
        thread::spawn(move || {
            for _ in 0..3 {
                mine(&ledger, &cancel, 2).unwrap();
            }
        })
    };

    for handle in submitters {
        handle.join().unwrap();
    }
    miner.join().unwrap();

    let guard = ledger.read();
    assert!(guard.validate().is_ok());
    assert_eq!(guard.len(), 4);

    let mut seen = HashSet::new();
    let mut total = guard.pending().len();
    for block in guard.blocks() {
        total += block.transactions.len();
        for tx in &block.transactions {
            assert!(seen.insert((tx.sender.clone(), tx.amount)), "duplicate {:?}", tx);
        }
    }
    for tx in guard.pending() {
        assert!(seen.insert((tx.sender.clone(), tx.amount)), "duplicate {:?}", tx);
    }
    assert_eq!(total, 200);
}

#[test]
fn test_per_sender_order_is_preserved() {
    let ledger = Ledger::new().into_shared();
    let cancel = AtomicBool::new(false);

    for i in 0..10 {
        ledger.write().new_transaction("alice", "bob", i);
        if i == 4 {
            mine(&ledger, &cancel, 1).unwrap();
        }
    }
    mine(&ledger, &cancel, 1).unwrap();

    let guard = ledger.read();
    let amounts: Vec<i64> = guard
        .blocks()
        .iter()
        .flat_map(|b| b.transactions.iter().map(|tx| tx.amount))
        .collect();
    assert_eq!(amounts, (0..10).collect::<Vec<_>>());
}
