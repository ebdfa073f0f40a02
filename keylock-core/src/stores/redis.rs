//! Redis lock store
//!
//! Maps each [`LockStore`] primitive onto one Redis command. Requires the
//! `redis` feature to be enabled.

use crate::error::StoreResult;
use crate::stores::LockStore;
use async_trait::async_trait;
use keylock_redis::{RedisConfig, RedisService};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Swap in a new claim only if the current one is stale.
///
/// Claims are nanosecond timestamps, beyond the 2^53 that Lua numbers hold
/// exactly, so they are compared as digit strings: longer is larger, equal
/// lengths compare lexically.
const SWAP_IF_STALE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local stale
    if string.match(current, '^%-%d+$') then
        stale = true
    elseif string.match(current, '^%d+$') then
        local now = ARGV[2]
        stale = current ~= '0' and (#now > #current or (#now == #current and now > current))
    else
        return redis.error_reply('keylock: non-integer claim under ' .. KEYS[1])
    end
    if not stale then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[3])
return 1
"#;

/// Redis-backed lock store
///
/// Shares one pooled [`RedisService`] across every lock that uses it.
pub struct RedisLockStore {
    redis: Arc<RedisService>,
    prefix: Option<String>,
    swap_if_stale: redis::Script,
}

impl RedisLockStore {
    /// Create a store over an existing service.
    ///
    /// The key prefix comes from the service's [`RedisConfig::key_prefix`].
    pub fn new(redis: Arc<RedisService>) -> Self {
        let prefix = redis.config().key_prefix.clone();
        Self {
            redis,
            prefix,
            swap_if_stale: redis::Script::new(SWAP_IF_STALE_SCRIPT),
        }
    }

    /// Connect a fresh pool and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be built or the first `PING` fails.
    pub async fn connect(config: RedisConfig) -> StoreResult<Self> {
        debug!(url = %config.url, "Connecting to Redis for distributed locks");
        let redis = RedisService::new(config).await?;
        Ok(Self::new(Arc::new(redis)))
    }

    /// The underlying service
    pub fn service(&self) -> &Arc<RedisService> {
        &self.redis
    }

    /// Get the full key with prefix
    fn key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("{}:{}", prefix, key)),
            None => Cow::Borrowed(key),
        }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<bool> {
        let key = self.key(key);
        Ok(self.redis.set_nx_px(&key, value, ttl).await?)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = self.key(key);
        Ok(self.redis.get_value(&key).await?)
    }

    async fn swap(&self, key: &str, value: i64) -> StoreResult<Option<String>> {
        let key = self.key(key);
        Ok(self.redis.get_set(&key, value).await?)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let key = self.key(key);
        Ok(self.redis.pexpire(&key, ttl).await?)
    }

    async fn swap_if_stale(
        &self,
        key: &str,
        value: i64,
        now_nanos: i64,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let key = self.key(key);
        let args = [
            value.to_string(),
            now_nanos.to_string(),
            keylock_redis::ttl_millis(ttl).to_string(),
        ];
        let swapped: i64 = self.redis.eval(&self.swap_if_stale, &key, &args).await?;
        trace!(key = %key, swapped = swapped == 1, "Redis swap_if_stale");
        Ok(swapped == 1)
    }

    fn supports_swap_if_stale(&self) -> bool {
        true
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}
