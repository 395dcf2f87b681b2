//! World modules: one topical section of a world.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use worldforge_core::error::DomainError;

use super::registry::{FieldMap, ModuleDefinition, ModuleKey, is_blank};

/// A partial field update: `None` or blank text removes the field.
pub type FieldUpdates = BTreeMap<String, Option<String>>;

/// Authoring and generation status of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    /// No field has any text.
    Empty,
    /// Some text, but a required field is still blank.
    InProgress,
    /// Every required field is filled.
    Ready,
    /// Queued for (re)generation.
    AwaitingGeneration,
    /// Narrative text generated from the current fields.
    Completed,
    /// The last generation attempt failed.
    Failed,
}

impl ModuleStatus {
    /// Returns the stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::InProgress => "IN_PROGRESS",
            Self::Ready => "READY",
            Self::AwaitingGeneration => "AWAITING_GENERATION",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(Self::Empty),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "READY" => Ok(Self::Ready),
            "AWAITING_GENERATION" => Ok(Self::AwaitingGeneration),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::Validation(format!(
                "unknown module status: {other}"
            ))),
        }
    }
}

/// One topical section of a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldModule {
    /// Module identifier.
    pub id: Uuid,
    /// Owning world.
    pub world_id: Uuid,
    /// Which registry module this is.
    pub module_key: ModuleKey,
    /// Authored field values.
    pub fields: FieldMap,
    /// Fingerprint of `fields` as of the last recomputation.
    pub content_hash: Option<String>,
    /// Generated narrative text.
    pub full_content: Option<String>,
    /// When `full_content` was last written.
    pub full_content_updated_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: ModuleStatus,
    /// Write counter for optimistic concurrency.
    pub revision: i64,
    /// Who last edited the fields.
    pub last_edited_by: Option<Uuid>,
    /// When the fields were last edited.
    pub last_edited_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

impl WorldModule {
    /// Creates an empty module for a world.
    #[must_use]
    pub fn new_empty(world_id: Uuid, module_key: ModuleKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            world_id,
            module_key,
            fields: FieldMap::new(),
            content_hash: None,
            full_content: None,
            full_content_updated_at: None,
            status: ModuleStatus::Empty,
            revision: 0,
            last_edited_by: None,
            last_edited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the registry definition of this module.
    #[must_use]
    pub fn definition(&self) -> &'static ModuleDefinition {
        self.module_key.definition()
    }

    /// Returns true once narrative text has been generated.
    #[must_use]
    pub fn has_generated_content(&self) -> bool {
        self.full_content.as_deref().is_some_and(|text| !is_blank(text))
    }

    /// Whether this module may inform the generation of its siblings.
    /// Partially filled drafts are kept out of prompts.
    #[must_use]
    pub fn is_context_eligible(&self) -> bool {
        matches!(self.status, ModuleStatus::Completed | ModuleStatus::Ready)
            || self.has_generated_content()
    }

    /// Applies a partial update to the field map. Every key is validated
    /// against the registry before anything is touched.
    ///
    /// Returns whether the field map changed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for unknown field keys or values
    /// outside the field's length bounds.
    pub fn apply_field_updates(&mut self, updates: &FieldUpdates) -> Result<bool, DomainError> {
        let definition = self.definition();
        for (key, value) in updates {
            let field = definition.require_field(key)?;
            if let Some(text) = value.as_deref().filter(|text| !is_blank(text)) {
                field.validate(text)?;
            }
        }

        let mut changed = false;
        for (key, value) in updates {
            match value.as_deref().filter(|text| !is_blank(text)) {
                Some(text) => {
                    if self.fields.get(key).map(String::as_str) != Some(text) {
                        self.fields.insert(key.clone(), text.to_owned());
                        changed = true;
                    }
                }
                None => {
                    if self.fields.remove(key).is_some() {
                        changed = true;
                    }
                }
            }
        }
        Ok(changed)
    }

    /// Queues the module for generation.
    pub fn mark_awaiting_generation(&mut self, now: DateTime<Utc>) {
        self.status = ModuleStatus::AwaitingGeneration;
        self.updated_at = now;
    }

    /// Stores freshly generated narrative text.
    pub fn complete_generation(&mut self, content: String, now: DateTime<Utc>) {
        self.store_generated_content(content, now);
        self.status = ModuleStatus::Completed;
    }

    /// Stores generated text without touching the status.
    pub fn store_generated_content(&mut self, content: String, now: DateTime<Utc>) {
        self.full_content = Some(content);
        self.full_content_updated_at = Some(now);
        self.updated_at = now;
    }

    /// Records a failed generation attempt.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = ModuleStatus::Failed;
        self.updated_at = now;
    }
}
