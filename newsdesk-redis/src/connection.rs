//! Connection bootstrap with capped exponential backoff.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

use crate::{RedisConfig, RedisError, Result};

/// Open a shared, auto-reconnecting connection to the broker.
///
/// The initial connection is retried according to
/// [`RedisConfig::reconnect`]; once established, the returned
/// [`ConnectionManager`] is cheap to clone and safe to use from every
/// producer and worker slot concurrently.
pub async fn connect(config: &RedisConfig) -> Result<ConnectionManager> {
    let client = Client::open(config.url.as_str()).map_err(|e| RedisError::Config(e.to_string()))?;
    let max_attempts = config.reconnect.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match tokio::time::timeout(
            config.connection_timeout,
            ConnectionManager::new(client.clone()),
        )
        .await
        {
            Ok(Ok(mut manager)) => match ping(&mut manager).await {
                Ok(()) => {
                    info!(url = %config.redacted_url(), attempt, "Connected to Redis");
                    return Ok(manager);
                }
                Err(e) => e.to_string(),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => RedisError::Timeout.to_string(),
        };

        if attempt >= max_attempts {
            return Err(RedisError::Connection(format!(
                "{} unreachable after {} attempts: {}",
                config.redacted_url(),
                attempt,
                error
            )));
        }

        let delay = config.reconnect.delay_for_attempt(attempt);
        warn!(
            url = %config.redacted_url(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Redis connection failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Check that the connection answers.
pub async fn ping(conn: &mut ConnectionManager) -> Result<()> {
    let _: String = redis::cmd("PING").query_async(conn).await?;
    Ok(())
}
