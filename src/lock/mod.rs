//! Lock Module
//!
//! Distributed mutual exclusion over a [`KeyedStore`](crate::store::KeyedStore).
//!
//! # Locks
//! - [`lock`]: one-shot, expires on its own, never released explicitly
//! - [`LeaseLock`]: renewed in the background until closed or lost

mod lease;

use std::time::Duration;

use tracing::debug;

use crate::error::{CacheError, Result};
use crate::store::KeyedStore;

pub use lease::LeaseLock;

// == Public Constants ==
/// Renewal interval used when the caller does not pick one.
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_millis(500);

/// Leases renewed less often than this are deleted on close rather than
/// left to expire.
pub const DELETE_THRESHOLD: Duration = Duration::from_millis(1000);

/// Value stored by the one-shot lock.
const SENTINEL: &str = "1";

// == One-Shot Lock ==
/// Claims `name` for `expire` (at least one second) without renewal.
///
/// Returns [`CacheError::Locked`] when the key is already held. There is no
/// unlock; the key frees itself when the TTL runs out.
pub async fn lock(store: &dyn KeyedStore, name: &str, expire: Duration) -> Result<()> {
    let expire = expire.max(Duration::from_secs(1));
    if store.set_if_absent(name, SENTINEL, expire).await? {
        debug!("Locked {} for {:?}", name, expire);
        Ok(())
    } else {
        Err(CacheError::Locked)
    }
}
