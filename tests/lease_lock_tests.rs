//! Integration Tests for the lease lock
//!
//! Contention, renewal and takeover against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use lease_cache::{lock, CacheError, KeyedStore, LeaseLock};
use lease_cache::store::MemoryStore;

fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

// == Mutual Exclusion ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_has_single_winner() {
    let store = memory_store();
    let contenders = 32;

    let mut handles = Vec::with_capacity(contenders);
    for _ in 0..contenders {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            LeaseLock::acquire(store, "jobs:nightly", Duration::from_millis(200)).await
        }));
    }

    let mut winners = Vec::new();
    let mut locked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(lease) => winners.push(lease),
            Err(CacheError::Locked) => locked += 1,
            Err(err) => panic!("unexpected error: {}", err),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(locked, contenders - 1);

    for lease in winners.iter_mut() {
        lease.release().await;
    }
}

#[tokio::test]
async fn test_release_lets_next_owner_in() {
    let store = memory_store();

    let mut first = LeaseLock::acquire(store.clone(), "handoff", Duration::from_millis(100))
        .await
        .unwrap();
    first.release().await;

    let mut second = LeaseLock::acquire(store.clone(), "handoff", Duration::from_millis(100))
        .await
        .unwrap();
    assert_ne!(first.owner_token(), second.owner_token());
    second.release().await;
}

// == Renewal ==

#[tokio::test]
async fn test_renewal_outlives_initial_ttl() {
    let store = memory_store();
    let mut lease = LeaseLock::acquire(store.clone(), "renewed", Duration::from_millis(50))
        .await
        .unwrap();

    // Several TTLs of wall time
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(lease.is_held());
    let (token, _) = store.get_with_ttl("renewed").await.unwrap().unwrap();
    assert_eq!(token, lease.owner_token());

    lease.release().await;
}

#[tokio::test]
async fn test_takeover_marks_lease_lost() {
    let store = memory_store();
    let lease = LeaseLock::acquire(store.clone(), "stolen", Duration::from_millis(50))
        .await
        .unwrap();

    store
        .set("stolen", "intruder", Duration::from_secs(10))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), lease.lost())
        .await
        .unwrap();
    assert!(lease.is_lost());
    assert!(!lease.is_held());

    // The new owner's record is untouched
    let (token, _) = store.get_with_ttl("stolen").await.unwrap().unwrap();
    assert_eq!(token, "intruder");
}

// == Fencing ==

#[tokio::test]
async fn test_expired_owner_cannot_extend_new_owners_lease() {
    let store = memory_store();
    let mut stale = LeaseLock::acquire(store.clone(), "fenced", Duration::from_millis(100))
        .await
        .unwrap();
    let stale_token = stale.owner_token().to_string();

    // Short interval: close stops renewal but leaves the key to expire
    stale.close().await;
    assert!(store.get_with_ttl("fenced").await.unwrap().is_some());

    store.advance(Duration::from_millis(300));
    assert!(store.get_with_ttl("fenced").await.unwrap().is_none());

    let mut fresh = LeaseLock::acquire(store.clone(), "fenced", Duration::from_millis(100))
        .await
        .unwrap();

    let extended = store
        .extend_if_owner("fenced", &stale_token, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(!extended);

    let (token, _) = store.get_with_ttl("fenced").await.unwrap().unwrap();
    assert_eq!(token, fresh.owner_token());

    fresh.release().await;
}

#[tokio::test]
async fn test_long_interval_close_deletes_key() {
    let store = memory_store();
    let mut lease = LeaseLock::acquire(store.clone(), "long", Duration::from_secs(2))
        .await
        .unwrap();

    lease.close().await;

    assert!(lease.is_closed());
    assert!(store.get_with_ttl("long").await.unwrap().is_none());
}

// == One-Shot Lock ==

#[tokio::test]
async fn test_one_shot_lock_expires_on_its_own() {
    let store = memory_store();

    lock(store.as_ref(), "once", Duration::from_millis(10))
        .await
        .unwrap();
    assert!(matches!(
        lock(store.as_ref(), "once", Duration::from_secs(1)).await,
        Err(CacheError::Locked)
    ));

    // Clamped to one second
    store.advance(Duration::from_millis(500));
    assert!(lock(store.as_ref(), "once", Duration::from_secs(1)).await.is_err());

    store.advance(Duration::from_millis(600));
    assert!(lock(store.as_ref(), "once", Duration::from_secs(1)).await.is_ok());
}
