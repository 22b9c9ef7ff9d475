//! Retry configuration and strategies.

use crate::GenerationError;
use std::time::Duration;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Status codes that should trigger a retry.
    pub retry_status_codes: Vec<u16>,
    /// Whether to retry on connection errors.
    pub retry_on_connection_error: bool,
    /// Whether to retry on timeout errors.
    pub retry_on_timeout: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: BackoffStrategy::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(8),
                multiplier: 2.0,
            },
            retry_status_codes: vec![408, 429, 500, 502, 503, 504],
            retry_on_connection_error: true,
            retry_on_timeout: true,
        }
    }
}

impl RetryConfig {
    /// Create a retry config with exponential backoff.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::Exponential {
                initial: initial_delay,
                max: Duration::from_secs(30),
                multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    /// Create a retry config with no delay.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::None,
            ..Default::default()
        }
    }

    /// Never retry.
    pub fn disabled() -> Self {
        Self::immediate(0)
    }

    /// Calculate delay before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff.delay_for_attempt(retry.saturating_sub(1))
    }

    /// Check whether `error` should be retried after `retries_done` retries.
    pub fn should_retry(&self, retries_done: u32, error: &GenerationError) -> bool {
        if retries_done >= self.max_retries {
            return false;
        }

        match error {
            GenerationError::Timeout(_) => self.retry_on_timeout,
            GenerationError::Connection(_) => self.retry_on_connection_error,
            GenerationError::Api { status, .. } => self.retry_status_codes.contains(status),
            GenerationError::Http(e) => {
                if e.is_timeout() {
                    self.retry_on_timeout
                } else if e.is_connect() {
                    self.retry_on_connection_error
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Exponential backoff: delay multiplies each attempt.
    Exponential {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier (typically 2.0).
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(attempt.min(30) as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}
