//! OpenAI-compatible HTTP client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::{GenerationConfig, GenerationError, GenerationRequest, Result, TextGenerator};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for chat completions in JSON mode and embeddings.
#[derive(Clone)]
pub struct OpenAiClient {
    inner: reqwest::Client,
    config: Arc<GenerationConfig>,
}

impl OpenAiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: GenerationConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Config("API key is empty".to_string()));
        }

        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Config(e.to_string()))?;

        Ok(Self {
            inner,
            config: Arc::new(config),
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// POST `body` to `path`, retrying transient failures.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        let mut retries = 0;

        loop {
            match self.post_once(&url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if self.config.retry.should_retry(retries, &e) => {
                    retries += 1;
                    let delay = self.config.retry.delay_for_retry(retries);
                    debug!(
                        attempt = retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying generation request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if retries > 0 && e.is_retryable() => {
                    return Err(GenerationError::RetryExhausted {
                        attempts: retries + 1,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .inner
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::from_transport(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate_json(&self, request: GenerationRequest) -> Result<Value> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response: ChatResponse = self.post_json("chat/completions", &body).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("no choices returned".to_string()))?;

        let value: Value = serde_json::from_str(&content)
            .map_err(|e| GenerationError::InvalidResponse(format!("content is not JSON: {e}")))?;
        if !value.is_object() {
            return Err(GenerationError::InvalidResponse(
                "content is not a JSON object".to_string(),
            ));
        }
        Ok(value)
    }

    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest { model, input };
        let response: EmbeddingResponse = self.post_json("embeddings", &body).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GenerationError::InvalidResponse("no embedding returned".to_string()))
    }
}
