//! Redis connection pool.

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use tracing::info;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

/// Open a pool for `config` and make sure the server answers a `PING`
/// within the connection timeout.
pub(crate) async fn connect(config: &RedisConfig) -> Result<RedisPool> {
    let manager = RedisConnectionManager::new(config.connection_url()?)
        .map_err(|e| RedisError::Connection(e.to_string()))?;

    let pool = Pool::builder()
        .max_size(config.pool_size)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| RedisError::Pool(e.to_string()))?;

    // Scoped so the PING connection goes back to the pool before returning
    {
        let mut conn = pool.get().await?;
        let ping_cmd = redis::cmd("PING");
        let ping = ping_cmd.query_async::<String>(&mut *conn);
        tokio::time::timeout(config.connection_timeout, ping)
            .await
            .map_err(|_| RedisError::Timeout)?
            .map_err(|e| RedisError::Connection(e.to_string()))?;
    }

    info!(
        pool_size = config.pool_size,
        url = %config.url,
        database = ?config.database,
        tls = config.tls,
        "Redis lock pool ready"
    );

    Ok(pool)
}
