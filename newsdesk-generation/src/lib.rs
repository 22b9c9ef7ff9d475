//! # Newsdesk Generation
//!
//! Client for an OpenAI-compatible generative-text service: chat
//! completions in JSON mode and embeddings, with retry on transient
//! failures.
//!
//! Handlers depend on the [`TextGenerator`] trait; [`ScriptedGenerator`]
//! answers from closures for tests and offline runs.
//!
//! ```rust,no_run
//! use newsdesk_generation::*;
//!
//! # async fn example() -> Result<()> {
//! let client = OpenAiClient::new(GenerationConfig::new("sk-..."))?;
//! let item = client
//!     .generate_json(GenerationRequest::new(DEFAULT_MODEL, "Summarize as JSON: ..."))
//!     .await?;
//! println!("{}", item);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod generator;
mod retry;
mod scripted;

pub use client::OpenAiClient;
pub use config::{DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL, GenerationConfig};
pub use error::{GenerationError, Result};
pub use generator::{GenerationRequest, TextGenerator};
pub use retry::{BackoffStrategy, RetryConfig};
pub use scripted::{ScriptedGenerator, letter_histogram};
