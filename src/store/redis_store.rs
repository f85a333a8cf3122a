//! Redis Store Module
//!
//! `KeyedStore` over a Redis server. Lease renewal runs as a Lua script so
//! the token comparison and the expiry update happen in one server step.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Script, Value};
use tracing::debug;

use super::KeyedStore;
use crate::error::Result;

/// Re-arms the lease when the caller still owns it, or re-claims it when the
/// key has lapsed and nobody else took it. Replies nil otherwise.
const EXTEND_SCRIPT: &str = r#"
local v = redis.call("GET", KEYS[1])
if v == false then
    return redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2], "NX")
elseif v == ARGV[1] then
    redis.call("PEXPIRE", KEYS[1], ARGV[2])
    return "OK"
end
return false
"#;

// == Redis Store ==
/// Shared store backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    extend: Script,
}

impl RedisStore {
    // == Constructor ==
    /// Connects to the Redis server at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        debug!("Connected to redis at {}", url);
        Ok(Self::from_connection(conn))
    }

    /// Wraps an existing multiplexed connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            extend: Script::new(EXTEND_SCRIPT),
        }
    }
}

/// PX argument; Redis rejects a zero expiry.
fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Maps a PTTL reply to a remaining TTL. `-1` means no expiry.
fn pttl_to_duration(pttl: i64) -> Option<Duration> {
    if pttl < 0 {
        None
    } else {
        Some(Duration::from_millis(pttl as u64))
    }
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(!matches!(reply, Value::Nil))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_with_ttl(&self, key: &str) -> Result<Option<(String, Option<Duration>)>> {
        let mut conn = self.conn.clone();
        let (value, pttl): (Option<String>, i64) = redis::pipe()
            .atomic()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        // -2: no such key
        if pttl == -2 {
            return Ok(None);
        }
        Ok(value.map(|value| (value, pttl_to_duration(pttl))))
    }

    async fn extend_if_owner(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Value = self
            .extend
            .key(key)
            .arg(token)
            .arg(ttl_ms(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(!matches!(reply, Value::Nil))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
