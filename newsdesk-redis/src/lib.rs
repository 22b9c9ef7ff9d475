//! # Newsdesk Redis
//!
//! Connection bootstrap for the Redis broker shared by the producer and all
//! worker slots.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use newsdesk_redis::{RedisConfig, connect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::new("redis://localhost:6379");
//!     let conn = connect(&config).await?;
//!
//!     // Clone freely; every clone shares the same multiplexed connection
//!     let for_worker = conn.clone();
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;

pub use config::{ReconnectPolicy, RedisConfig};
pub use connection::{connect, ping};
pub use error::{RedisError, Result};

// Re-export redis crate for convenience
pub use redis;
pub use redis::AsyncCommands;
pub use redis::aio::ConnectionManager;
