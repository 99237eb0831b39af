//! Concurrent claim tests for QueueStore
//!
//! Several connections to one database file claim from the same queue at
//! once; every task must be handed out exactly once.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use queuestore::{Claim, QueueStore, StoreOptions, TaskId};
use serde_json::json;
use tempfile::TempDir;

const TASKS: usize = 60;
const WORKERS: usize = 8;

fn seed(store: &QueueStore, queue: &str) {
    let items: Vec<_> = (0..TASKS).map(|i| json!({"url": format!("https://example.com/{}", i)})).collect();
    let report = store.enqueue(queue, &items, 0).expect("Failed to enqueue");
    assert_eq!(report.inserted, TASKS);
}

fn assert_claimed_once(claims: Vec<Vec<TaskId>>) {
    let all: Vec<TaskId> = claims.into_iter().flatten().collect();
    let unique: HashSet<TaskId> = all.iter().copied().collect();
    assert_eq!(all.len(), unique.len(), "a task was claimed twice");
    assert_eq!(unique.len(), TASKS);
}

#[test]
fn test_no_double_claim_across_connections() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("queue.db");
    seed(&QueueStore::open(&path, StoreOptions::default()).unwrap(), "preload");

    // Open every connection up front so schema setup does not race
    let stores: Vec<QueueStore> = (0..WORKERS)
        .map(|_| QueueStore::open(&path, StoreOptions::default()).unwrap())
        .collect();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = stores
        .into_iter()
        .map(|store| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut claimed = Vec::new();
                loop {
                    let batch = store.claim_batch("preload", 3).expect("claim failed");
                    if batch.is_empty() {
                        break;
                    }
                    claimed.extend(batch.iter().map(|t| t.id));
                }
                claimed
            })
        })
        .collect();

    let claims = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_claimed_once(claims);
}

#[test]
fn test_no_double_claim_shared_handle() {
    let store = Arc::new(QueueStore::open_in_memory(StoreOptions::default()).unwrap());
    seed(&store, "preload");
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut claimed = Vec::new();
                loop {
                    let batch = store.claim_batch("preload", 2).expect("claim failed");
                    if batch.is_empty() {
                        break;
                    }
                    claimed.extend(batch.iter().map(|t| t.id));
                }
                claimed
            })
        })
        .collect();

    let claims = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_claimed_once(claims);
}

#[test]
fn test_exclusive_claim_admits_one_batch() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let path = temp.path().join("queue.db");
    seed(&QueueStore::open(&path, StoreOptions::default()).unwrap(), "preload");

    let stores: Vec<QueueStore> = (0..WORKERS)
        .map(|_| QueueStore::open(&path, StoreOptions::default()).unwrap())
        .collect();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = stores
        .into_iter()
        .enumerate()
        .map(|(i, store)| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store
                    .claim_exclusive("preload", 5, &format!("worker-{}", i))
                    .expect("claim failed")
            })
        })
        .collect();

    let claims: Vec<Claim> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let batches: Vec<&Vec<_>> = claims
        .iter()
        .filter_map(|c| match c {
            Claim::Batch(tasks) => Some(tasks),
            Claim::Busy => None,
        })
        .collect();

    assert_eq!(batches.len(), 1, "exactly one worker should win the queue");
    assert_eq!(batches[0].len(), 5);
}
