//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheOptions, RetryPolicy};

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix of every cache and lock key
    pub cache_name: String,
    /// Cache entry TTL in seconds
    pub expire_secs: u64,
    /// Refresh-ahead window in seconds
    pub safety_secs: u64,
    /// Reload inline instead of in the background
    pub sync_refresh: bool,
    /// Lease renewal interval in milliseconds
    pub lock_renew_interval_ms: u64,
    /// Extra lease attempts on misses and writes
    pub lock_retry_attempts: u32,
    /// Pause between lease attempts in milliseconds
    pub lock_retry_delay_ms: u64,
    /// Redis URL; the in-memory store is used when unset
    pub redis_url: Option<String>,
    /// HTTP server port
    pub server_port: u16,
    /// In-memory store cleanup interval in seconds
    pub cleanup_interval: u64,
    /// Artificial latency of the demo source in milliseconds
    pub source_latency_ms: u64,
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Key prefix (default: "lease_cache")
    /// - `CACHE_EXPIRE_SECS` - Entry TTL (default: 600)
    /// - `CACHE_SAFETY_SECS` - Refresh-ahead window (default: 30)
    /// - `CACHE_SYNC_REFRESH` - Reload inline (default: false)
    /// - `LOCK_RENEW_INTERVAL_MS` - Lease renewal interval (default: 500)
    /// - `LOCK_RETRY_ATTEMPTS` - Extra lease attempts (default: 20)
    /// - `LOCK_RETRY_DELAY_MS` - Pause between attempts (default: 50)
    /// - `REDIS_URL` - Shared store (default: unset, in-memory)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - In-memory purge frequency in seconds (default: 1)
    /// - `SOURCE_LATENCY_MS` - Demo source latency (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_name: env::var("CACHE_NAME").unwrap_or(defaults.cache_name),
            expire_secs: var_or("CACHE_EXPIRE_SECS", defaults.expire_secs),
            safety_secs: var_or("CACHE_SAFETY_SECS", defaults.safety_secs),
            sync_refresh: var_or("CACHE_SYNC_REFRESH", defaults.sync_refresh),
            lock_renew_interval_ms: var_or("LOCK_RENEW_INTERVAL_MS", defaults.lock_renew_interval_ms),
            lock_retry_attempts: var_or("LOCK_RETRY_ATTEMPTS", defaults.lock_retry_attempts),
            lock_retry_delay_ms: var_or("LOCK_RETRY_DELAY_MS", defaults.lock_retry_delay_ms),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            server_port: var_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: var_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            source_latency_ms: var_or("SOURCE_LATENCY_MS", defaults.source_latency_ms),
        }
    }

    /// Cache tuning derived from this configuration.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            expire: Duration::from_secs(self.expire_secs),
            safety: Duration::from_secs(self.safety_secs),
            synchronous: self.sync_refresh,
            lock_renew_interval: Duration::from_millis(self.lock_renew_interval_ms),
            lock_retry: RetryPolicy {
                attempts: self.lock_retry_attempts,
                delay: Duration::from_millis(self.lock_retry_delay_ms),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_name: "lease_cache".to_string(),
            expire_secs: 600,
            safety_secs: 30,
            sync_refresh: false,
            lock_renew_interval_ms: 500,
            lock_retry_attempts: 20,
            lock_retry_delay_ms: 50,
            redis_url: None,
            server_port: 3000,
            cleanup_interval: 1,
            source_latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache_name, "lease_cache");
        assert_eq!(config.expire_secs, 600);
        assert_eq!(config.safety_secs, 30);
        assert!(!config.sync_refresh);
        assert_eq!(config.server_port, 3000);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_EXPIRE_SECS");
        env::remove_var("CACHE_SAFETY_SECS");
        env::remove_var("CACHE_SYNC_REFRESH");
        env::remove_var("SERVER_PORT");

        let config = Config::from_env();
        assert_eq!(config.expire_secs, 600);
        assert_eq!(config.safety_secs, 30);
        assert!(!config.sync_refresh);
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_cache_options_from_config() {
        let config = Config {
            expire_secs: 120,
            safety_secs: 10,
            sync_refresh: true,
            lock_retry_attempts: 3,
            lock_retry_delay_ms: 25,
            ..Config::default()
        };

        let options = config.cache_options();
        assert_eq!(options.expire, Duration::from_secs(120));
        assert_eq!(options.safety, Duration::from_secs(10));
        assert!(options.synchronous);
        assert_eq!(options.lock_renew_interval, Duration::from_millis(500));
        assert_eq!(options.lock_retry.attempts, 3);
        assert_eq!(options.lock_retry.delay, Duration::from_millis(25));
        assert!(options.validate().is_ok());
    }
}
