//! Cache Entry Module
//!
//! The record stored under a cache key, and the codecs that turn cached
//! values into payload text.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Entry ==
/// Stored form of a cached lookup.
///
/// A tombstone (`valid == false`) records that the source confirmed the
/// value is absent. That is different from having no entry at all, which
/// means the cache knows nothing yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl CacheEntry {
    /// Entry holding an encoded value.
    pub fn valid(payload: String) -> Self {
        Self {
            valid: true,
            payload: Some(payload),
        }
    }

    /// Entry marking a confirmed absence.
    pub fn tombstone() -> Self {
        Self {
            valid: false,
            payload: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        !self.valid
    }

    /// Serializes the envelope for the store.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope read from the store.
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decodes the payload with `codec`. Tombstones yield `None`.
    pub fn value<T>(&self, codec: &dyn Codec<T>) -> Result<Option<T>> {
        if !self.valid {
            return Ok(None);
        }
        match &self.payload {
            Some(payload) => codec.decode(payload).map(Some),
            None => Err(CacheError::Codec(
                "valid entry without payload".to_string(),
            )),
        }
    }
}

// == Codec ==
/// Turns values into payload text and back.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<String>;
    fn decode(&self, payload: &str) -> Result<T>;
}

/// serde_json payloads.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, payload: &str) -> Result<T> {
        Ok(serde_json::from_str(payload)?)
    }
}
