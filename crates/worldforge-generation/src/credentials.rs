//! Credentials provider backed by server configuration.
//!
//! Every owner shares the provider settings the server was started with.

use async_trait::async_trait;
use uuid::Uuid;
use worldforge_worlds::domain::generation::{
    CredentialsLookup, CredentialsProvider, GenerationCredentials,
};

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Hands the same configured settings to every owner.
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    lookup: CredentialsLookup,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

impl StaticCredentialsProvider {
    /// Classifies raw settings once, at construction.
    ///
    /// A missing key means the provider is unconfigured. A key with an
    /// unusable URL or no model is invalid.
    #[must_use]
    pub fn from_settings(
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Self {
        let lookup = match (present(api_key), present(model)) {
            (None, _) => CredentialsLookup::Unconfigured,
            (Some(_), None) => CredentialsLookup::Invalid("no model configured".to_owned()),
            (Some(api_key), Some(model)) => {
                let base_url = present(base_url).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
                if base_url.starts_with("http://") || base_url.starts_with("https://") {
                    CredentialsLookup::Configured(GenerationCredentials {
                        api_key,
                        base_url,
                        model,
                    })
                } else {
                    CredentialsLookup::Invalid(format!("base URL is not http(s): {base_url}"))
                }
            }
        };
        Self { lookup }
    }

    /// Whether usable settings were supplied.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        matches!(self.lookup, CredentialsLookup::Configured(_))
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    async fn resolve(&self, _owner_id: Uuid) -> CredentialsLookup {
        self.lookup.clone()
    }
}
