//! Prompt rendering via `minijinja`.
//!
//! Templates come from a YAML catalog with two maps: `partials`, shared
//! snippets available to `{% include %}`, and `modules`, the final prompt of
//! each module keyed by module key. The catalog shipped in
//! `prompts/module_final.yaml` is embedded in the binary; operators can point
//! `PROMPTS_PATH` at their own copy.

use std::collections::BTreeMap;
use std::path::Path;

use minijinja::Environment;
use serde::Deserialize;
use tracing::debug;
use worldforge_worlds::domain::generation::{GenerationError, PromptRenderer};
use worldforge_worlds::domain::registry::ModuleKey;

use crate::error::SetupError;

const EMBEDDED_CATALOG: &str = include_str!("../prompts/module_final.yaml");

#[derive(Debug, Deserialize)]
struct PromptCatalog {
    #[serde(default)]
    partials: BTreeMap<String, String>,
    modules: BTreeMap<ModuleKey, String>,
}

fn module_template_name(module_key: ModuleKey) -> String {
    format!("module/{module_key}")
}

/// Renders module prompts from a compiled template catalog.
pub struct MiniJinjaPromptRenderer {
    env: Environment<'static>,
}

impl MiniJinjaPromptRenderer {
    /// Builds a renderer from the embedded catalog.
    ///
    /// # Errors
    ///
    /// Returns `SetupError` if the embedded catalog fails to compile.
    pub fn embedded() -> Result<Self, SetupError> {
        Self::from_yaml(EMBEDDED_CATALOG)
    }

    /// Builds a renderer from a catalog file.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::Io` if the file cannot be read, or the errors of
    /// [`Self::from_yaml`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SetupError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Builds a renderer from catalog YAML.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::Catalog` for malformed YAML or unknown module
    /// keys, and `SetupError::Template` if a template does not compile.
    pub fn from_yaml(source: &str) -> Result<Self, SetupError> {
        let catalog: PromptCatalog = serde_yaml::from_str(source)?;
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        for (name, template) in catalog.partials {
            add_template(&mut env, name, template)?;
        }
        for (module_key, template) in catalog.modules {
            add_template(&mut env, module_template_name(module_key), template)?;
        }

        Ok(Self { env })
    }

    /// Whether a final template is registered for `module_key`.
    #[must_use]
    pub fn has_template(&self, module_key: ModuleKey) -> bool {
        self.env
            .get_template(&module_template_name(module_key))
            .is_ok()
    }
}

fn add_template(
    env: &mut Environment<'static>,
    name: String,
    template: String,
) -> Result<(), SetupError> {
    env.add_template_owned(name.clone(), template)
        .map_err(|e| SetupError::Template {
            name,
            message: e.to_string(),
        })
}

impl PromptRenderer for MiniJinjaPromptRenderer {
    fn render(
        &self,
        module_key: ModuleKey,
        context: &serde_json::Value,
    ) -> Result<String, GenerationError> {
        if !context.is_object() {
            return Err(GenerationError::Render(
                "prompt context must be an object".to_owned(),
            ));
        }

        let template = self
            .env
            .get_template(&module_template_name(module_key))
            .map_err(|_| {
                GenerationError::Render(format!(
                    "no prompt template registered for '{module_key}'"
                ))
            })?;
        let prompt = template
            .render(context)
            .map_err(|e| GenerationError::Render(format!("{module_key}: {e}")))?;

        debug!(module_key = %module_key, length = prompt.len(), "prompt rendered");
        Ok(prompt.trim().to_owned())
    }
}

impl std::fmt::Debug for MiniJinjaPromptRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniJinjaPromptRenderer").finish_non_exhaustive()
    }
}
