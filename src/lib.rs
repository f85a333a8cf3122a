//! Lease Cache - refresh-ahead caching over a shared keyed store
//!
//! A read-through cache that reloads entries shortly before they expire
//! while letting only one caller across all processes hit the source, using
//! a renewable lease lock held in the same store.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod models;
pub mod source;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheOptions, RefreshAheadCache, RetryPolicy};
pub use config::Config;
pub use error::{CacheError, Result};
pub use lock::{lock, LeaseLock};
pub use source::SourceAccessor;
pub use store::KeyedStore;
pub use tasks::spawn_cleanup_task;
