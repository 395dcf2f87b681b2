//! Ports to the collaborators that turn a module into narrative text:
//! credential lookup, prompt rendering and the text generator.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::registry::ModuleKey;

/// Provider settings used for one generation call.
#[derive(Clone, PartialEq, Eq)]
pub struct GenerationCredentials {
    /// Secret API key.
    pub api_key: String,
    /// Provider base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
}

impl fmt::Debug for GenerationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationCredentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Outcome of resolving an owner's provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsLookup {
    /// Usable settings.
    Configured(GenerationCredentials),
    /// The owner has not configured a provider.
    Unconfigured,
    /// Settings exist but cannot be used.
    Invalid(String),
}

/// Failure of a single generation attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// No usable provider settings.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// The prompt could not be rendered.
    #[error("prompt render error: {0}")]
    Render(String),

    /// The provider call failed.
    #[error("{0}")]
    Upstream(String),

    /// The provider answered with no text.
    #[error("generation returned an empty result")]
    EmptyResult,
}

/// Resolves the provider settings of a world's owner.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Looks up the settings for `owner_id`.
    async fn resolve(&self, owner_id: Uuid) -> CredentialsLookup;
}

/// Renders the "final" prompt of a module.
pub trait PromptRenderer: Send + Sync {
    /// Renders the template registered for `module_key` with `context`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Render` if no template is registered or
    /// rendering fails.
    fn render(
        &self,
        module_key: ModuleKey,
        context: &serde_json::Value,
    ) -> Result<String, GenerationError>;
}

/// Generates narrative text from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends `prompt` to the provider described by `credentials`.
    async fn generate(
        &self,
        prompt: &str,
        credentials: &GenerationCredentials,
    ) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_api_key() {
        let credentials = GenerationCredentials {
            api_key: "sk-secret".to_owned(),
            base_url: "https://api.example.com/v1".to_owned(),
            model: "story-large".to_owned(),
        };

        let rendered = format!("{credentials:?}");

        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("story-large"));
    }

    #[test]
    fn test_upstream_error_displays_message_unchanged() {
        let err = GenerationError::Upstream("upstream timeout".to_owned());

        assert_eq!(err.to_string(), "upstream timeout");
    }
}
