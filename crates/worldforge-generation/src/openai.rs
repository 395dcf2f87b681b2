//! Text generation over OpenAI-compatible chat completions APIs.
//!
//! Sends requests to `{base_url}/chat/completions`, which covers `OpenAI`,
//! `DeepSeek`, Ollama and most hosted gateways.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use worldforge_worlds::domain::generation::{
    GenerationCredentials, GenerationError, TextGenerator,
};

use crate::error::SetupError;

const SYSTEM_PROMPT: &str = "You are a worldbuilding writer. You turn an author's notes into \
     coherent, evocative prose for a world bible. Answer with the chapter text only.";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Calls the chat completions endpoint named by the credentials.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleGenerator {
    client: reqwest::Client,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleGenerator {
    /// Creates a generator whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::Client` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, SetupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            temperature: 0.8,
            max_tokens: 2048,
        })
    }

    /// Overrides the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Overrides the completion token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request_body(&self, prompt: &str, model: &str) -> Value {
        json!({
            "model": model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Extracts `choices[0].message.content` from a chat completions response.
fn extract_content(json: &Value) -> Result<String, GenerationError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            GenerationError::Upstream(
                "provider response missing choices[0].message.content".to_owned(),
            )
        })
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    #[instrument(skip_all, fields(model = %credentials.model))]
    async fn generate(
        &self,
        prompt: &str,
        credentials: &GenerationCredentials,
    ) -> Result<String, GenerationError> {
        let url = completions_url(&credentials.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.api_key)
            .json(&self.request_body(prompt, &credentials.model))
            .send()
            .await
            .map_err(|e| GenerationError::Upstream(format!("provider request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(GenerationError::Upstream(format!(
                "provider returned {status}: {error_body}"
            )));
        }

        let json: Value = response.json().await.map_err(|e| {
            GenerationError::Upstream(format!("provider response parse failed: {e}"))
        })?;
        let content = extract_content(&json)?;

        debug!(length = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_tolerates_trailing_slash() {
        assert_eq!(
            completions_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:11434/v1"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_extract_content_reads_first_choice() {
        // Arrange
        let json = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "In the beginning there was song."}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        });

        // Act
        let content = extract_content(&json).unwrap();

        // Assert
        assert_eq!(content, "In the beginning there was song.");
    }

    #[test]
    fn test_extract_content_rejects_response_without_choices() {
        // Arrange
        let json = json!({"error": {"message": "model overloaded"}});

        // Act
        let result = extract_content(&json);

        // Assert
        assert!(matches!(result, Err(GenerationError::Upstream(_))));
    }

    #[test]
    fn test_request_body_carries_model_and_prompt() {
        // Arrange
        let generator = OpenAiCompatibleGenerator::new(DEFAULT_TIMEOUT)
            .unwrap()
            .with_temperature(0.5)
            .with_max_tokens(256);

        // Act
        let body = generator.request_body("Describe Aldmere", "story-large");

        // Assert
        assert_eq!(body["model"], "story-large");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Describe Aldmere");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 256);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_an_upstream_error() {
        // Arrange
        let generator = OpenAiCompatibleGenerator::new(Duration::from_secs(5)).unwrap();
        let credentials = GenerationCredentials {
            api_key: "sk-test".to_owned(),
            base_url: "http://127.0.0.1:9".to_owned(),
            model: "story-large".to_owned(),
        };

        // Act
        let result = generator.generate("Describe Aldmere", &credentials).await;

        // Assert
        match result {
            Err(GenerationError::Upstream(message)) => {
                assert!(message.starts_with("provider request failed"));
            }
            other => panic!("expected Upstream error, got {other:?}"),
        }
    }
}
