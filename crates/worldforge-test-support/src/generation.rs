//! Test doubles for the generation ports.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;
use worldforge_worlds::domain::generation::{
    CredentialsLookup, CredentialsProvider, GenerationCredentials, GenerationError,
    PromptRenderer, TextGenerator,
};
use worldforge_worlds::domain::registry::ModuleKey;

/// Renders `"[<module_key>] <world name>"` and records every context it
/// was given.
#[derive(Debug, Default)]
pub struct StubPromptRenderer {
    rendered: Mutex<Vec<(ModuleKey, serde_json::Value)>>,
}

impl StubPromptRenderer {
    /// Creates a renderer with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts passed to `render`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn rendered(&self) -> Vec<(ModuleKey, serde_json::Value)> {
        self.rendered.lock().unwrap().clone()
    }
}

impl PromptRenderer for StubPromptRenderer {
    fn render(
        &self,
        module_key: ModuleKey,
        context: &serde_json::Value,
    ) -> Result<String, GenerationError> {
        self.rendered
            .lock()
            .unwrap()
            .push((module_key, context.clone()));
        let world = context["world"]["name"].as_str().unwrap_or_default();
        Ok(format!("[{module_key}] {world}"))
    }
}

/// A generator that answers from a script.
///
/// Queued responses are used first. After that, a prompt containing a
/// registered failure needle fails with that error, and every other prompt
/// gets `"Generated: <prompt>"`.
#[derive(Debug, Default)]
pub struct ScriptedTextGenerator {
    queued: Mutex<VecDeque<Result<String, GenerationError>>>,
    failures: Mutex<Vec<(String, GenerationError)>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedTextGenerator {
    /// A generator that echoes every prompt.
    #[must_use]
    pub fn echo() -> Self {
        Self::default()
    }

    /// Queues one response for the next call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn push_response(&self, response: Result<String, GenerationError>) {
        self.queued.lock().unwrap().push_back(response);
    }

    /// Fails every prompt containing `needle` with `error`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_when_prompt_contains(&self, needle: &str, error: GenerationError) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_owned(), error));
    }

    /// Removes every registered failure.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Prompts received so far, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _credentials: &GenerationCredentials,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        if let Some(response) = self.queued.lock().unwrap().pop_front() {
            return response;
        }
        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, error)| error.clone());
        match failure {
            Some(error) => Err(error),
            None => Ok(format!("Generated: {prompt}")),
        }
    }
}

/// A credentials provider returning the same lookup for every owner.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub CredentialsLookup);

impl StaticCredentials {
    /// Usable test credentials.
    #[must_use]
    pub fn configured() -> Self {
        Self(CredentialsLookup::Configured(GenerationCredentials {
            api_key: "test-key".to_owned(),
            base_url: "http://localhost:9".to_owned(),
            model: "test-model".to_owned(),
        }))
    }

    /// No provider configured.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self(CredentialsLookup::Unconfigured)
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn resolve(&self, _owner_id: Uuid) -> CredentialsLookup {
        self.0.clone()
    }
}
