//! In-Memory Store Module
//!
//! A process-local `KeyedStore` with millisecond TTLs. Used by the demo
//! server and by tests that need several "processes" sharing one store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::KeyedStore;
use crate::error::{CacheError, Result};

// == Stored Value ==
/// A single value with its expiry deadline.
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    expires_at: Option<u64>,
}

impl StoredValue {
    fn new(value: &str, ttl: Duration, now: u64) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Some(now + ttl.as_millis() as u64),
        }
    }

    /// Expired once the clock reaches the deadline.
    fn is_expired(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    fn ttl_remaining(&self, now: u64) -> Option<Duration> {
        self.expires_at
            .map(|expires| Duration::from_millis(expires.saturating_sub(now)))
    }
}

// == Memory Store ==
/// Shared in-process keyed store.
///
/// The store keeps its own clock so tests can skip time forward with
/// [`MemoryStore::advance`] instead of sleeping through lease windows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    /// Milliseconds added to the wall clock
    skew_ms: AtomicU64,
    /// When set, every operation fails as if the store were unreachable
    offline: AtomicBool,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Clock ==
    /// Current store time in Unix milliseconds.
    pub fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis() as u64 + self.skew_ms.load(Ordering::Relaxed)
    }

    /// Moves the store clock forward, expiring everything whose TTL falls
    /// inside the skipped span.
    pub fn advance(&self, by: Duration) {
        self.skew_ms
            .fetch_add(by.as_millis() as u64, Ordering::Relaxed);
    }

    // == Fault Injection ==
    /// Makes every subsequent operation fail with a store error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(CacheError::Store("memory store is offline".to_string()));
        }
        Ok(())
    }

    // == Purge Expired ==
    /// Removes all expired entries and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = self.now_ms();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_expired(now));
        before - entries.len()
    }

    // == Length ==
    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = self.now_ms();
        let entries = self.entries.lock().await;
        entries.values().filter(|stored| !stored.is_expired(now)).count()
    }

    #[allow(dead_code)]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check_online()?;
        let now = self.now_ms();
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(key) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }

        entries.insert(key.to_string(), StoredValue::new(value, ttl, now));
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check_online()?;
        let now = self.now_ms();
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), StoredValue::new(value, ttl, now));
        Ok(())
    }

    async fn get_with_ttl(&self, key: &str) -> Result<Option<(String, Option<Duration>)>> {
        self.check_online()?;
        let now = self.now_ms();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(stored) if stored.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(stored) => Ok(Some((stored.value.clone(), stored.ttl_remaining(now)))),
            None => Ok(None),
        }
    }

    async fn extend_if_owner(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.check_online()?;
        let now = self.now_ms();
        let mut entries = self.entries.lock().await;

        match entries.get_mut(key) {
            Some(stored) if !stored.is_expired(now) => {
                if stored.value != token {
                    return Ok(false);
                }
                stored.expires_at = Some(now + ttl.as_millis() as u64);
                Ok(true)
            }
            _ => {
                entries.insert(key.to_string(), StoredValue::new(token, ttl, now));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_online()?;
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}
