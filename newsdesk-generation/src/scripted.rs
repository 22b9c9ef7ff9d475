//! Offline generator with scripted responses.

use crate::{GenerationRequest, Result, TextGenerator};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

type GenerateFn = dyn Fn(&GenerationRequest) -> Result<Value> + Send + Sync;
type EmbedFn = dyn Fn(&str) -> Result<Vec<f32>> + Send + Sync;

/// Letter-frequency vector; similar texts get similar vectors.
pub fn letter_histogram(text: &str) -> Vec<f32> {
    let mut counts = vec![0.0f32; 26];
    for c in text.chars().filter(char::is_ascii_alphabetic) {
        counts[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    counts
}

/// A [`TextGenerator`] that answers from closures and records every call.
///
/// Defaults: `generate_json` returns `{"headline": <first prompt line>}` and
/// `embed` returns [`letter_histogram`] of the input.
pub struct ScriptedGenerator {
    generate: Box<GenerateFn>,
    embed: Box<EmbedFn>,
    requests: Mutex<Vec<GenerationRequest>>,
    embed_inputs: Mutex<Vec<String>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            generate: Box::new(|request: &GenerationRequest| -> Result<Value> {
                let headline = request.prompt.lines().next().unwrap_or_default();
                Ok(json!({ "headline": headline }))
            }),
            embed: Box::new(|input: &str| -> Result<Vec<f32>> { Ok(letter_histogram(input)) }),
            requests: Mutex::new(Vec::new()),
            embed_inputs: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer chat requests with `f`.
    pub fn on_generate<F>(mut self, f: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<Value> + Send + Sync + 'static,
    {
        self.generate = Box::new(f);
        self
    }

    /// Answer embedding requests with `f`.
    pub fn on_embed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<f32>> + Send + Sync + 'static,
    {
        self.embed = Box::new(f);
        self
    }

    /// Chat requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Embedding inputs received so far.
    pub fn embed_inputs(&self) -> Vec<String> {
        self.embed_inputs.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_json(&self, request: GenerationRequest) -> Result<Value> {
        let response = (self.generate)(&request);
        self.requests.lock().push(request);
        response
    }

    async fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>> {
        self.embed_inputs.lock().push(input.to_string());
        (self.embed)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationError;

    #[tokio::test]
    async fn test_records_requests_and_uses_script() {
        let generator = ScriptedGenerator::new().on_generate(|request| {
            if request.prompt.contains("fail") {
                Err(GenerationError::InvalidResponse("scripted".into()))
            } else {
                Ok(json!({ "ok": true }))
            }
        });

        assert!(generator
            .generate_json(GenerationRequest::new("m", "hello"))
            .await
            .is_ok());
        assert!(generator
            .generate_json(GenerationRequest::new("m", "please fail"))
            .await
            .is_err());
        assert_eq!(generator.requests().len(), 2);
    }

    #[test]
    fn test_letter_histogram() {
        let v = letter_histogram("Abba!");
        assert_eq!(v[0], 2.0);
        assert_eq!(v[1], 2.0);
        assert_eq!(v.iter().sum::<f32>(), 4.0);
    }
}
