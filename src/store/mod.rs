//! Keyed Store Module
//!
//! The shared, TTL-capable store that holds cache entries and lease records.
//! Every process talking to the same store sees the same locks.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

// == Keyed Store ==
/// Minimal primitive set the lock and cache layers need from a shared store.
///
/// Implementations must make `set_if_absent` and `extend_if_owner` atomic on
/// the store side; the lease lock relies on that for mutual exclusion.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Writes `value` under `key` with `ttl` only if the key does not exist.
    ///
    /// Returns `true` when the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Unconditionally writes `value` under `key` with `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Reads a value together with its remaining TTL in one round trip.
    ///
    /// `None` means the key does not exist. A `None` TTL means the key never
    /// expires.
    async fn get_with_ttl(&self, key: &str) -> Result<Option<(String, Option<Duration>)>>;

    /// Resets the TTL of `key` to `ttl` if its current value equals `token`.
    ///
    /// If the key is gone it is re-created with `token` as long as nobody
    /// else claimed it in between. Returns `false` when another owner holds
    /// the key.
    async fn extend_if_owner(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Removes `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
