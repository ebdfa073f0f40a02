//! Lock coordinator configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LockError, LockResult};

/// Default wait between failed attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Default number of attempts beyond the first.
pub const DEFAULT_RETRIES: u32 = 3;

/// Type alias for a retry error predicate function.
pub type RetryPredicate = Arc<dyn Fn(&LockError) -> bool + Send + Sync>;

/// How a stale claim is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimStrategy {
    /// Swap in the new claim, then check that the value swapped out was
    /// itself stale. A fresh claim written by a competitor between the read
    /// and the swap is overwritten and lost.
    #[default]
    SwapAndRecheck,
    /// Let the store swap only if the current value is stale, in one atomic
    /// step. Requires [`LockStore::supports_swap_if_stale`](crate::LockStore::supports_swap_if_stale).
    CompareAndSwap,
}

impl ReclaimStrategy {
    /// Parse from a config string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "swap_and_recheck" | "swap" => Some(Self::SwapAndRecheck),
            "compare_and_swap" | "cas" => Some(Self::CompareAndSwap),
            _ => None,
        }
    }
}

/// Which failed attempts the retrying acquisition retries.
///
/// Caller errors (bad key, expiration in the past, bad config) are never
/// retried whatever the policy says.
#[derive(Clone, Default)]
pub enum RetryOn {
    /// Retry contention and store failures alike.
    #[default]
    All,
    /// Retry only [`LockError::LockFailed`]; store failures return at once.
    Contention,
    /// Retry contention and transient store failures such as a dropped
    /// connection or a pool timeout. Malformed claims return at once.
    Transient,
    /// Use a custom predicate.
    Custom(RetryPredicate),
}

impl RetryOn {
    /// Only retry errors matching `predicate`.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&LockError) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Parse from a config string. Custom predicates cannot be configured
    /// from text.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Some(Self::All),
            "contention" | "lock_failed" => Some(Self::Contention),
            "transient" => Some(Self::Transient),
            _ => None,
        }
    }

    /// Decide whether `error` warrants another attempt.
    pub fn should_retry(&self, error: &LockError) -> bool {
        if error.is_caller_error() || error.is_exhausted() {
            return false;
        }
        match self {
            Self::All => true,
            Self::Contention => error.is_lock_failed(),
            Self::Transient => error.is_lock_failed() || error.is_transient(),
            Self::Custom(predicate) => predicate(error),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Contention => "contention",
            Self::Transient => "transient",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for RetryOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Contention => write!(f, "Contention"),
            Self::Transient => write!(f, "Transient"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Lock coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Attempts beyond the first. Must be at least one.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Wait between failed attempts. Must be non-zero.
    #[serde(rename = "interval_ms", with = "millis_serde", default = "default_interval")]
    pub interval: Duration,
    /// Which failures are retried.
    #[serde(with = "retry_on_serde", default)]
    pub retry_on: RetryOn,
    /// How stale claims are reclaimed.
    #[serde(default)]
    pub reclaim: ReclaimStrategy,
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            interval: DEFAULT_INTERVAL,
            retry_on: RetryOn::default(),
            reclaim: ReclaimStrategy::default(),
        }
    }
}

impl LockConfig {
    /// Create a configuration with explicit retry knobs.
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self {
            retries,
            interval,
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// - `KEYLOCK_RETRIES`
    /// - `KEYLOCK_RETRY_INTERVAL_MS`
    /// - `KEYLOCK_RETRY_ON` (`all`, `contention` or `transient`)
    /// - `KEYLOCK_RECLAIM` (`swap_and_recheck` or `compare_and_swap`)
    ///
    /// Unparseable values are ignored and the default kept.
    pub fn from_env() -> LockConfigBuilder {
        let mut builder = LockConfigBuilder::new();

        if let Ok(retries) = std::env::var("KEYLOCK_RETRIES")
            && let Ok(retries) = retries.parse() {
                builder = builder.retries(retries);
            }

        if let Ok(interval) = std::env::var("KEYLOCK_RETRY_INTERVAL_MS")
            && let Ok(millis) = interval.parse() {
                builder = builder.interval(Duration::from_millis(millis));
            }

        if let Ok(retry_on) = std::env::var("KEYLOCK_RETRY_ON")
            && let Some(retry_on) = RetryOn::parse(&retry_on) {
                builder = builder.retry_on(retry_on);
            }

        if let Ok(reclaim) = std::env::var("KEYLOCK_RECLAIM")
            && let Some(reclaim) = ReclaimStrategy::parse(&reclaim) {
                builder = builder.reclaim(reclaim);
            }

        builder
    }

    /// Reject configurations that would produce an unusable coordinator.
    pub fn validate(&self) -> LockResult<()> {
        if self.retries == 0 {
            return Err(LockError::config("retries must be at least 1"));
        }
        if self.interval.is_zero() {
            return Err(LockError::config("retry interval must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for lock configuration.
#[derive(Debug, Default)]
pub struct LockConfigBuilder {
    config: LockConfig,
}

impl LockConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts beyond the first.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the wait between attempts.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the retry policy.
    pub fn retry_on(mut self, retry_on: RetryOn) -> Self {
        self.config.retry_on = retry_on;
        self
    }

    /// Set the reclaim strategy.
    pub fn reclaim(mut self, reclaim: ReclaimStrategy) -> Self {
        self.config.reclaim = reclaim;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> LockResult<LockConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod retry_on_serde {
    use super::RetryOn;
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(retry_on: &RetryOn, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match retry_on {
            RetryOn::Custom(_) => Err(S::Error::custom(
                "a custom retry predicate cannot be serialized",
            )),
            other => serializer.serialize_str(other.name()),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<RetryOn, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RetryOn::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("unknown retry policy: {}", raw)))
    }
}
