//! Backoff policies

use std::time::Duration;

use chq_config::StoreConfig;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time
    Fixed(Duration),
    /// `base * 2^n`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                // cap the shift so the multiplication can't overflow
                let factor = 1u32 << retry.min(16);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Bounded retries with a backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub const fn none() -> Self {
        Self {
            retries: 0,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }
}

impl From<&StoreConfig> for RetryPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            retries: config.retry_attempts,
            backoff: Backoff::Exponential {
                base: config.retry_base_delay,
                max: config.retry_max_delay,
            },
        }
    }
}
