//! Redis service wrapping the pool with the single-key commands a lock needs.

use bb8::PooledConnection;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::trace;

use crate::{RedisConfig, Result, pool::RedisPool};

/// Redis service providing a connection pool and typed single-key commands.
pub struct RedisService {
    config: RedisConfig,
    pool: RedisPool,
}

impl RedisService {
    /// Connect to the server described by `config`.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = crate::pool::connect(&config).await?;
        Ok(Self { config, pool })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn conn(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        Ok(self.pool.get().await?)
    }

    /// `SET key value NX PX ttl`. Returns `true` when the key was created.
    pub async fn set_nx_px<T: redis::ToRedisArgs + Send + Sync>(
        &self,
        key: &str,
        value: T,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await?;
        trace!(key = %key, created = result.is_some(), "SET NX PX");
        Ok(result.is_some())
    }

    /// Get a value.
    pub async fn get_value<T: redis::FromRedisValue>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn().await?;
        let value: Option<T> = conn.get(key).await?;
        Ok(value)
    }

    /// Plain `SET key value` with no expiry.
    pub async fn set<V>(&self, key: &str, value: V) -> Result<()>
    where
        V: redis::ToRedisArgs + redis::ToSingleRedisArg + Send + Sync,
    {
        let mut conn = self.conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    /// `GETSET key value`. Returns the value held before the write.
    ///
    /// Like the server command, this drops any TTL the key had.
    pub async fn get_set<T, V>(&self, key: &str, value: V) -> Result<Option<T>>
    where
        T: redis::FromRedisValue,
        V: redis::ToRedisArgs + Send + Sync,
    {
        let mut conn = self.conn().await?;
        let previous: Option<T> = redis::cmd("GETSET")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await?;
        Ok(previous)
    }

    /// `PEXPIRE key ttl`. Returns `false` when the key does not exist.
    pub async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(applied)
    }

    /// Remaining TTL of a key, `None` when it has no expiry or does not exist.
    pub async fn pttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn().await?;
        let ttl: i64 = redis::cmd("PTTL").arg(key).query_async(&mut *conn).await?;
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(ttl as u64)))
        }
    }

    /// Delete a key.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted: u32 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    /// Run a Lua script against a single key.
    pub async fn eval<T: redis::FromRedisValue>(
        &self,
        script: &redis::Script,
        key: &str,
        args: &[String],
    ) -> Result<T> {
        let mut conn = self.conn().await?;
        let result: T = script
            .key(key)
            .arg(args)
            .invoke_async(&mut *conn)
            .await?;
        Ok(result)
    }
}

/// Convert a TTL to whole milliseconds, rounding up, never below one.
///
/// Rounding up keeps a key alive at least until the instant it was meant to
/// cover.
pub fn ttl_millis(ttl: Duration) -> u64 {
    let nanos = ttl.as_nanos();
    let millis = nanos.div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}
