//! The generator abstraction handlers depend on.

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A single JSON-mode generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier.
    pub model: String,
    /// Optional system instruction.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
}

impl GenerationRequest {
    /// Create a request for `model` with `prompt`.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
        }
    }

    /// Add a system instruction.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// External generative-text service.
///
/// Implementations must be safe to call from many worker slots at once.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a response and parse it as a JSON object.
    async fn generate_json(&self, request: GenerationRequest) -> Result<Value>;

    /// Compute an embedding vector for `input`.
    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>>;
}
