//! Retry budget and backoff between upload attempts

use crate::core::config::AgentConfig;
use std::time::Duration;

/// Delay between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// Same delay every time
    Fixed(Duration),
    /// base * 2^retry, capped at max
    Exponential { base: Duration, max: Duration },
    /// Retry immediately
    None,
}

impl BackoffPolicy {
    /// Delay after the given failed attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.min(u32::MAX as usize) as u32);
                base.saturating_mul(factor).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: usize,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let backoff = match config.upload_retry_delay() {
            Duration::ZERO => BackoffPolicy::None,
            base => BackoffPolicy::Exponential {
                base,
                max: base.saturating_mul(10),
            },
        };
        Self::new(config.upload_attempts, backoff)
    }
}
