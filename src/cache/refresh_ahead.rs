//! Refresh-Ahead Cache Module
//!
//! Read-through cache over a [`KeyedStore`] that reloads entries from the
//! source shortly before they expire. Only the holder of the key's lease
//! talks to the source; every other caller keeps serving the cached value
//! until the reload lands.
//!
//! Each lookup is classified from the store's state:
//! - miss: no entry. Load synchronously under the lease.
//! - fresh: more than `safety` left. Return it.
//! - stale: `safety` or less left. Try the lease once; whoever gets it
//!   reloads (inline or in the background), everyone returns the cached value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::entry::{CacheEntry, Codec, JsonCodec};
use super::key::CacheKey;
use super::stats::{CacheStats, StatsRecorder};
use crate::error::{CacheError, Result};
use crate::lock::{LeaseLock, DEFAULT_RENEW_INTERVAL};
use crate::source::SourceAccessor;
use crate::store::KeyedStore;
use crate::tasks::RefreshSupervisor;

// == Options ==
/// Bounded retry used when a miss or a write finds the lease taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Fail with [`CacheError::Locked`] on the first contention.
    pub const fn none() -> Self {
        Self {
            attempts: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    /// Roughly one default lease TTL of waiting.
    fn default() -> Self {
        Self {
            attempts: 20,
            delay: Duration::from_millis(50),
        }
    }
}

/// Tuning for a [`RefreshAheadCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// TTL of every entry written
    pub expire: Duration,
    /// Remaining TTL at or below which a hit triggers a reload
    pub safety: Duration,
    /// Reload inline instead of in the background
    pub synchronous: bool,
    /// Renewal interval of the per-key lease
    pub lock_renew_interval: Duration,
    /// Retry for misses and writes that find the lease taken
    pub lock_retry: RetryPolicy,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expire: Duration::from_secs(600),
            safety: Duration::from_secs(30),
            synchronous: false,
            lock_renew_interval: DEFAULT_RENEW_INTERVAL,
            lock_retry: RetryPolicy::default(),
        }
    }
}

impl CacheOptions {
    /// Rejects a safety window that would make every entry stale.
    pub fn validate(&self) -> Result<()> {
        if self.safety >= self.expire {
            return Err(CacheError::InvalidConfig(format!(
                "safety ({:?}) must be below expire ({:?})",
                self.safety, self.expire
            )));
        }
        Ok(())
    }
}

// == Refresh-Ahead Cache ==
/// Stampede-safe read-through cache. Cloning shares the same cache.
pub struct RefreshAheadCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RefreshAheadCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    name: String,
    store: Arc<dyn KeyedStore>,
    source: Arc<dyn SourceAccessor<T>>,
    codec: Arc<dyn Codec<T>>,
    options: CacheOptions,
    synchronous: AtomicBool,
    stats: StatsRecorder,
    supervisor: RefreshSupervisor,
}

/// Result of waiting for a contended lease on a miss.
enum MissLease<T> {
    Acquired(LeaseLock),
    /// Another owner filled the entry while we waited
    Filled(Option<T>),
}

impl<T> RefreshAheadCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache named `name` storing JSON payloads.
    ///
    /// Fails with [`CacheError::InvalidConfig`] if `options.safety` is not
    /// below `options.expire`.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn KeyedStore>,
        source: Arc<dyn SourceAccessor<T>>,
        options: CacheOptions,
    ) -> Result<Self> {
        Self::with_codec(name, store, source, Arc::new(JsonCodec::new()), options)
    }
}

impl<T> RefreshAheadCache<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a cache with a custom payload codec.
    pub fn with_codec(
        name: impl Into<String>,
        store: Arc<dyn KeyedStore>,
        source: Arc<dyn SourceAccessor<T>>,
        codec: Arc<dyn Codec<T>>,
        options: CacheOptions,
    ) -> Result<Self> {
        options.validate()?;
        let name = name.into();
        debug!(
            "Cache {} created: expire={:?}, safety={:?}, synchronous={}",
            name, options.expire, options.safety, options.synchronous
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                store,
                source,
                codec,
                synchronous: AtomicBool::new(options.synchronous),
                options,
                stats: StatsRecorder::default(),
                supervisor: RefreshSupervisor::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Keys used for `args` in this cache.
    pub fn key<S: AsRef<str>>(&self, args: &[S]) -> CacheKey {
        CacheKey::new(&self.inner.name, args)
    }

    // == Get ==
    /// Looks up `args`, loading from the source on a miss.
    ///
    /// `Ok(None)` means the source confirmed the value does not exist.
    /// Stale hits never fail because of a reload problem; they return the
    /// cached value.
    pub async fn get<S: AsRef<str>>(&self, args: &[S]) -> Result<Option<T>> {
        let key = self.key(args);
        let inner = &self.inner;

        let cached = match inner.read(&key).await {
            Ok(cached) => cached,
            Err(CacheError::Store(err)) => {
                warn!("Cache read for {} failed, treating as miss: {}", key, err);
                None
            }
            Err(err) => return Err(err),
        };

        let Some((entry, remaining)) = cached else {
            inner.stats.record_miss();
            return self.load_on_miss(&key).await;
        };

        let value = entry.value(inner.codec.as_ref())?;
        if entry.is_tombstone() {
            inner.stats.record_tombstone_hit();
        }
        if inner.is_fresh(remaining) {
            inner.stats.record_hit();
            return Ok(value);
        }

        inner.stats.record_stale_hit();
        Ok(self.refresh_stale(key, value).await)
    }

    async fn load_on_miss(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.inner.lease_for_miss(key).await? {
            MissLease::Acquired(lease) => self.inner.refresh_locked(key, lease).await,
            MissLease::Filled(value) => Ok(value),
        }
    }

    async fn refresh_stale(&self, key: CacheKey, stale: Option<T>) -> Option<T> {
        let inner = &self.inner;
        let synchronous = self.is_synchronous();
        if !synchronous && inner.supervisor.is_shut_down() {
            debug!("Background reloads are shut down, {} left stale", key);
            return stale;
        }

        let lease = match LeaseLock::acquire(
            inner.store.clone(),
            key.lock_key(),
            inner.options.lock_renew_interval,
        )
        .await
        {
            Ok(lease) => lease,
            Err(CacheError::Locked) => {
                inner.stats.record_contention();
                debug!("Reload of {} already in progress, serving stale", key);
                return stale;
            }
            Err(err) => {
                warn!("Could not take lease for {}, serving stale: {}", key, err);
                return stale;
            }
        };

        if synchronous {
            return match inner.refresh_locked(&key, lease).await {
                Ok(fresh) => fresh,
                Err(err) => {
                    warn!("Synchronous reload of {} failed, serving stale: {}", key, err);
                    stale
                }
            };
        }

        // Shutdown may land between the check above and the spawn; the task
        // then never runs and the lease expires on its own
        let task_inner = self.inner.clone();
        let task_key = key.clone();
        let spawned = inner.supervisor.spawn(async move {
            if let Err(err) = task_inner.refresh_locked(&task_key, lease).await {
                warn!("Background reload of {} failed: {}", task_key, err);
            }
        });
        if !spawned {
            debug!("Background reloads are shut down, {} left stale", key);
        }
        stale
    }

    // == Set ==
    /// Writes `data` to the source, then caches it, under the key's lease.
    pub async fn set<S: AsRef<str>>(&self, data: &T, args: &[S]) -> Result<()> {
        let key = self.key(args);
        let inner = &self.inner;
        let mut lease = inner.lease_for_write(&key).await?;

        let result = async {
            inner
                .source
                .set(data, key.args())
                .await
                .map_err(CacheError::Source)?;
            inner.write(&key, Some(data)).await
        }
        .await;

        lease.release().await;
        result
    }

    // == Delete ==
    /// Deletes from the source, then caches a tombstone, under the key's lease.
    ///
    /// The tombstone keeps the next lookup from going back to a source
    /// replica that may not have seen the delete yet.
    pub async fn delete<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        let key = self.key(args);
        let inner = &self.inner;
        let mut lease = inner.lease_for_write(&key).await?;

        let result = async {
            inner
                .source
                .delete(key.args())
                .await
                .map_err(CacheError::Source)?;
            inner.write(&key, None).await
        }
        .await;

        lease.release().await;
        result
    }

    // == Mode ==
    /// Makes every reload run inline, for hosts that cannot keep background
    /// tasks alive after a request returns.
    pub fn disable_background_refresh(&self) {
        self.inner.synchronous.store(true, Ordering::Relaxed);
    }

    pub fn is_synchronous(&self) -> bool {
        self.inner.synchronous.load(Ordering::Relaxed)
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    // == Background Reloads ==
    /// Number of background reloads not yet reaped.
    pub fn pending_refreshes(&self) -> usize {
        self.inner.supervisor.in_flight()
    }

    /// Waits for background reloads started so far.
    pub async fn wait_for_refreshes(&self) {
        self.inner.supervisor.wait_idle().await;
    }

    /// Cancels background reloads and stops starting new ones. Stale hits
    /// after this keep serving the cached value without reloading.
    pub async fn shutdown(&self) {
        self.inner.supervisor.shutdown().await;
    }
}

impl<T> Inner<T>
where
    T: Send + Sync + 'static,
{
    /// No TTL counts as fresh.
    fn is_fresh(&self, remaining: Option<Duration>) -> bool {
        remaining.map_or(true, |remaining| remaining > self.options.safety)
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<(CacheEntry, Option<Duration>)>> {
        match self.store.get_with_ttl(key.entry_key()).await? {
            Some((raw, remaining)) => Ok(Some((CacheEntry::decode(&raw)?, remaining))),
            None => Ok(None),
        }
    }

    /// Writes `value`, or a tombstone for `None`, with a full TTL.
    async fn write(&self, key: &CacheKey, value: Option<&T>) -> Result<()> {
        let entry = match value {
            Some(value) => CacheEntry::valid(self.codec.encode(value)?),
            None => CacheEntry::tombstone(),
        };
        self.store
            .set(key.entry_key(), &entry.encode()?, self.options.expire)
            .await
    }

    async fn acquire(&self, key: &CacheKey) -> Result<LeaseLock> {
        LeaseLock::acquire(
            self.store.clone(),
            key.lock_key(),
            self.options.lock_renew_interval,
        )
        .await
    }

    /// Retries the lease per `lock_retry`, re-reading the entry between
    /// attempts in case the current owner has already filled it.
    async fn lease_for_miss(&self, key: &CacheKey) -> Result<MissLease<T>> {
        let policy = self.options.lock_retry;
        let mut attempt = 0;
        loop {
            match self.acquire(key).await {
                Ok(lease) => return Ok(MissLease::Acquired(lease)),
                Err(CacheError::Locked) => self.stats.record_contention(),
                Err(err) => return Err(err),
            }
            if attempt >= policy.attempts {
                debug!("Gave up waiting for lease on {}", key);
                return Err(CacheError::Locked);
            }
            attempt += 1;
            tokio::time::sleep(policy.delay).await;

            match self.read(key).await {
                Ok(Some((entry, _))) => {
                    return Ok(MissLease::Filled(entry.value(self.codec.as_ref())?));
                }
                Ok(None) => {}
                Err(CacheError::Store(err)) => {
                    warn!("Cache re-read for {} failed, still waiting: {}", key, err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn lease_for_write(&self, key: &CacheKey) -> Result<LeaseLock> {
        let policy = self.options.lock_retry;
        let mut attempt = 0;
        loop {
            match self.acquire(key).await {
                Ok(lease) => return Ok(lease),
                Err(CacheError::Locked) if attempt < policy.attempts => {
                    self.stats.record_contention();
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                }
                Err(err) => {
                    if err.is_locked() {
                        self.stats.record_contention();
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Reloads `key` while holding `lease`, then releases it.
    async fn refresh_locked(&self, key: &CacheKey, mut lease: LeaseLock) -> Result<Option<T>> {
        let result = self.refresh(key, &lease).await;
        lease.release().await;

        match &result {
            Ok(_) => self.stats.record_refresh(),
            Err(_) => self.stats.record_refresh_failure(),
        }
        result
    }

    async fn refresh(&self, key: &CacheKey, lease: &LeaseLock) -> Result<Option<T>> {
        // The previous owner may have finished between our read and our lease
        if let Ok(Some((entry, remaining))) = self.read(key).await {
            if self.is_fresh(remaining) {
                if let Ok(value) = entry.value(self.codec.as_ref()) {
                    debug!("{} already reloaded by another owner", key);
                    return Ok(value);
                }
            }
        }

        let fetched = tokio::select! {
            biased;
            _ = lease.lost() => {
                warn!("Lease on {} lost during reload, abandoning it", key);
                return Err(CacheError::Locked);
            }
            fetched = self.source.get(key.args()) => fetched.map_err(CacheError::Source)?,
        };

        if !lease.is_held() {
            warn!("Lease on {} lost before write-back, discarding reload", key);
            return Err(CacheError::Locked);
        }
        self.write(key, fetched.as_ref()).await?;
        debug!("Reloaded {}", key);
        Ok(fetched)
    }
}
