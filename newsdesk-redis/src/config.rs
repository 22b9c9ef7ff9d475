//! Redis configuration.

use newsdesk_config::{AppConfig, redact_url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff for (re)connecting to the broker.
///
/// This governs broker reachability only; job handler failures are never
/// retried through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Connection attempts before giving up (at least 1).
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay after the `attempt`-th failure (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Timeout for a single connection attempt.
    pub connection_timeout: Duration,
    /// Backoff applied between failed connection attempts.
    pub reconnect: ReconnectPolicy,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl RedisConfig {
    /// Create a new configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build from the application configuration.
    pub fn from_app(app: &AppConfig) -> Self {
        Self::new(app.broker_url.clone())
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// The URL with its password masked, safe for logs.
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }
}
