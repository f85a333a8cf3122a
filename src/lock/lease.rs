//! Lease Lock Module
//!
//! A named lock that keeps itself alive. The holder writes a random owner
//! token with a TTL of twice the renewal interval, then a background task
//! re-arms that TTL every interval through the store's atomic
//! compare-and-extend. A crashed holder stops renewing and the key expires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{DEFAULT_RENEW_INTERVAL, DELETE_THRESHOLD};
use crate::error::{CacheError, Result};
use crate::store::KeyedStore;

// == Lease Lock ==
/// Exclusive, self-renewing hold on one key.
///
/// The lease ends when [`close`](LeaseLock::close) or
/// [`release`](LeaseLock::release) is called, when a renewal finds another
/// owner, or when the lock is dropped (the remote key then expires by TTL).
pub struct LeaseLock {
    store: Arc<dyn KeyedStore>,
    name: String,
    owner_token: String,
    renew_interval: Duration,
    /// Set by the renewal task when the remote record is no longer ours
    lost: Arc<AtomicBool>,
    /// Cancelled on close, drop, or loss
    cancel: CancellationToken,
    renewal: Option<JoinHandle<()>>,
}

impl LeaseLock {
    // == Acquire ==
    /// Takes the lease on `name`, renewing every `renew_interval`.
    ///
    /// Fails fast with [`CacheError::Locked`] if someone else holds it.
    /// Must be called from inside a tokio runtime.
    pub async fn acquire(
        store: Arc<dyn KeyedStore>,
        name: impl Into<String>,
        renew_interval: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let renew_interval = renew_interval.max(Duration::from_millis(1));
        let owner_token = Uuid::new_v4().simple().to_string();

        if !store
            .set_if_absent(&name, &owner_token, renew_interval * 2)
            .await?
        {
            return Err(CacheError::Locked);
        }
        debug!("Acquired lease {} every {:?}", name, renew_interval);

        let lost = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let renewal = tokio::spawn(renew_loop(
            store.clone(),
            name.clone(),
            owner_token.clone(),
            renew_interval,
            lost.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            store,
            name,
            owner_token,
            renew_interval,
            lost,
            cancel,
            renewal: Some(renewal),
        })
    }

    /// [`acquire`](LeaseLock::acquire) with [`DEFAULT_RENEW_INTERVAL`].
    pub async fn acquire_default(store: Arc<dyn KeyedStore>, name: impl Into<String>) -> Result<Self> {
        Self::acquire(store, name, DEFAULT_RENEW_INTERVAL).await
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fencing token written to the store for this acquisition.
    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }

    pub fn renew_interval(&self) -> Duration {
        self.renew_interval
    }

    /// True while the lease is neither closed nor lost.
    pub fn is_held(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// True once the lease has been closed or lost.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True if a renewal found the record missing our token.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Resolves once the lease is no longer held.
    pub async fn lost(&self) {
        self.cancel.cancelled().await
    }

    // == Close ==
    /// Stops renewal and waits for the renewal task to finish.
    ///
    /// Long-interval leases are also deleted remotely so the next owner does
    /// not have to wait out the TTL. Calling this more than once is a no-op.
    pub async fn close(&mut self) {
        let delete = self.renew_interval > DELETE_THRESHOLD;
        self.shutdown(delete).await;
    }

    // == Release ==
    /// Like [`close`](LeaseLock::close), but always frees the remote key if
    /// it still carries our token.
    pub async fn release(&mut self) {
        self.shutdown(true).await;
    }

    async fn shutdown(&mut self, delete: bool) {
        let Some(renewal) = self.renewal.take() else {
            return;
        };
        self.cancel.cancel();

        if let Err(err) = renewal.await {
            if err.is_panic() {
                warn!("Lease renewal task for {} panicked", self.name);
            }
        }

        if delete && !self.is_lost() {
            self.delete_if_owned().await;
        }
        debug!("Closed lease {}", self.name);
    }

    /// Best effort: the read and the delete are two round trips.
    async fn delete_if_owned(&self) {
        match self.store.get_with_ttl(&self.name).await {
            Ok(Some((value, _))) if value == self.owner_token => {
                if let Err(err) = self.store.delete(&self.name).await {
                    warn!("Failed to delete lease {}: {}", self.name, err);
                }
            }
            Ok(_) => {}
            Err(err) => warn!("Failed to read lease {} before delete: {}", self.name, err),
        }
    }
}

impl Drop for LeaseLock {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("name", &self.name)
            .field("renew_interval", &self.renew_interval)
            .field("held", &self.is_held())
            .finish()
    }
}

// == Renewal Task ==
async fn renew_loop(
    store: Arc<dyn KeyedStore>,
    name: String,
    owner_token: String,
    interval: Duration,
    lost: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; the lease was just written
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match store.extend_if_owner(&name, &owner_token, interval * 2).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("Lease {} was taken over by another owner", name);
                        break;
                    }
                    Err(err) => {
                        warn!("Lease {} renewal failed: {}", name, err);
                        break;
                    }
                }
            }
        }
    }

    if !cancel.is_cancelled() {
        lost.store(true, Ordering::Release);
        cancel.cancel();
    }
}
