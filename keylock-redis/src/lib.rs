//! # keylock Redis
//!
//! Redis plumbing for keylock: address and credential parsing, a pooled
//! connection service, and the handful of single-key commands the lock
//! store adapter issues.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keylock_redis::{RedisConfig, RedisService};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // `password@host:port` and `user:password@host:port` are both accepted
//!     let config = RedisConfig::from_addrs(&["worker:s3cret@localhost:6379"], 0)?;
//!     let redis = RedisService::new(config).await?;
//!
//!     let created = redis
//!         .set_nx_px("job-42", 1_700_000_000_000_000_000i64, Duration::from_secs(10))
//!         .await?;
//!     println!("claimed: {created}");
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::RedisPool;
pub use service::{RedisService, ttl_millis};

// Re-export redis crate for convenience
pub use redis;
