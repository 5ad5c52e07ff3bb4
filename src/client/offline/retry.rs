//! # Retry Backoff
//!
//! Delay between attempts of a transiently failing head effect. The decision
//! whether to retry at all belongs to the discard policy; this module only
//! answers "how long to wait".

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Backoff strategy configuration
#[derive(Clone)]
pub enum BackoffStrategy {
    /// Fixed interval between retries
    Fixed {
        /// Interval in milliseconds
        interval_ms: u64,
    },
    /// Doubling interval with an upper bound
    Exponential {
        /// First interval in milliseconds
        base_ms: u64,
        /// Maximum interval in milliseconds
        max_ms: u64,
    },
    /// Custom backoff function from retry count to milliseconds
    Custom(Arc<dyn Fn(u32) -> u64 + Send + Sync>),
}

impl fmt::Debug for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { interval_ms } => f.debug_struct("Fixed").field("interval_ms", interval_ms).finish(),
            Self::Exponential { base_ms, max_ms } => f
                .debug_struct("Exponential")
                .field("base_ms", base_ms)
                .field("max_ms", max_ms)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl BackoffStrategy {
    /// Delay before the attempt following the `retry_count`-th failure (1-based)
    pub fn delay(&self, retry_count: u32) -> Duration {
        let ms = match self {
            Self::Fixed { interval_ms } => *interval_ms,
            Self::Exponential { base_ms, max_ms } => {
                let factor = 1u64.checked_shl(retry_count.saturating_sub(1)).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor).min(*max_ms)
            }
            Self::Custom(calc_fn) => calc_fn(retry_count),
        };
        Duration::from_millis(ms)
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 500,
            max_ms: 60_000,
        }
    }
}
