//! Tests for the instance guard.
//!
//! Many acquisitions race for the same variant; the lock primitive must let
//! exactly one of them win regardless of scheduling.

#![cfg(any(unix, windows))]

use peerlaunch::{GuardProvider, LockFileProvider, Variant, default_provider};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_exactly_one_of_many_is_first() {
    const RACERS: usize = 16;

    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(LockFileProvider::new(dir.path()));
    let barrier = Arc::new(Barrier::new(RACERS));

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let provider = Arc::clone(&provider);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                provider.acquire(&Variant::main()).unwrap()
            })
        })
        .collect();

    let guards: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = guards.iter().filter(|g| g.is_first()).count();

    assert_eq!(winners, 1);
}

#[test]
fn test_single_acquisition_is_first() {
    let dir = tempfile::tempdir().unwrap();
    let guard = default_provider(dir.path())
        .acquire(&Variant::agent())
        .unwrap();
    assert!(guard.is_first());
}

#[test]
fn test_variants_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let provider = LockFileProvider::new(dir.path());

    let main = provider.acquire(&Variant::main()).unwrap();
    let beta = provider.acquire(&Variant::new("beta").unwrap()).unwrap();
    let main_again = provider.acquire(&Variant::main()).unwrap();

    assert!(main.is_first());
    assert!(beta.is_first());
    assert!(!main_again.is_first());
}

#[test]
fn test_winner_release_lets_next_launch_win() {
    let dir = tempfile::tempdir().unwrap();
    let provider = LockFileProvider::new(dir.path());

    let first = provider.acquire(&Variant::main()).unwrap();
    let loser = provider.acquire(&Variant::main()).unwrap();
    assert!(!loser.is_first());

    drop(first);
    drop(loser);
    assert!(provider.acquire(&Variant::main()).unwrap().is_first());
}
