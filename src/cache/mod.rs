//! Cache Module
//!
//! Refresh-ahead caching on top of a shared keyed store and a lease lock.

mod entry;
mod key;
mod refresh_ahead;
mod stats;


// Re-export public types
pub use entry::{CacheEntry, Codec, JsonCodec};
pub use key::CacheKey;
pub use refresh_ahead::{CacheOptions, RefreshAheadCache, RetryPolicy};
pub use stats::CacheStats;
