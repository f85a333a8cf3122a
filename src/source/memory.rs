//! In-process source of truth backed by a map.
//!
//! Stands in for a database in the demo server and in tests. It can add
//! latency to every call and be told to fail reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SourceAccessor;

/// Map-backed [`SourceAccessor`]. Values are keyed by their arguments joined
/// with `:`.
#[derive(Debug)]
pub struct MemorySource<T> {
    values: RwLock<HashMap<String, T>>,
    latency: Duration,
    fail_gets: AtomicBool,
    get_calls: AtomicU64,
}

impl<T> MemorySource<T> {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Every call sleeps for `latency` before touching the map.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            latency,
            fail_gets: AtomicBool::new(false),
            get_calls: AtomicU64::new(0),
        }
    }

    /// Makes `get` return an error until switched back.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::Relaxed);
    }

    /// Number of `get` calls so far, failed ones included.
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Writes straight into the map, bypassing any cache.
    pub async fn insert(&self, args: &[&str], value: T) {
        self.values.write().await.insert(args.join(":"), value);
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl<T> Default for MemorySource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> SourceAccessor<T> for MemorySource<T>
where
    T: Clone + Send + Sync,
{
    async fn get(&self, args: &[String]) -> anyhow::Result<Option<T>> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        self.pause().await;
        if self.fail_gets.load(Ordering::Relaxed) {
            bail!("source unavailable for {}", args.join(":"));
        }
        Ok(self.values.read().await.get(&args.join(":")).cloned())
    }

    async fn set(&self, data: &T, args: &[String]) -> anyhow::Result<()> {
        self.pause().await;
        self.values
            .write()
            .await
            .insert(args.join(":"), data.clone());
        Ok(())
    }

    async fn delete(&self, args: &[String]) -> anyhow::Result<()> {
        self.pause().await;
        self.values.write().await.remove(&args.join(":"));
        Ok(())
    }
}
