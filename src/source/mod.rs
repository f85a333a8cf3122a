//! Source Module
//!
//! The authoritative backend the cache fronts.

mod memory;

use async_trait::async_trait;

pub use memory::MemorySource;

// == Source Accessor ==
/// Read/write access to the source of truth.
///
/// `args` are the lookup arguments the cache key was built from. A missing
/// value is `Ok(None)`, never an error.
#[async_trait]
pub trait SourceAccessor<T>: Send + Sync {
    async fn get(&self, args: &[String]) -> anyhow::Result<Option<T>>;

    async fn set(&self, data: &T, args: &[String]) -> anyhow::Result<()>;

    async fn delete(&self, args: &[String]) -> anyhow::Result<()>;
}
