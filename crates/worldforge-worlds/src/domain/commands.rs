//! Commands for the world generation context.

use uuid::Uuid;
use worldforge_core::command::Command;

use super::module::FieldUpdates;
use super::registry::ModuleKey;

/// Command to create a world with one empty module per registry key.
#[derive(Debug, Clone)]
pub struct CreateWorld {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The author creating the world.
    pub owner_id: Uuid,
    /// Display name.
    pub name: String,
    /// One-line pitch.
    pub tagline: Option<String>,
    /// Ordered list of themes.
    pub themes: Vec<String>,
    /// What the author wants the world to convey.
    pub creative_intent: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl Command for CreateWorld {
    fn command_type(&self) -> &'static str {
        "worlds.create_world"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Uuid {
        self.owner_id
    }
}

/// Command to apply a partial update to a module's fields.
#[derive(Debug, Clone)]
pub struct UpdateModuleFields {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The editing user.
    pub editor_id: Uuid,
    /// The world that owns the module.
    pub world_id: Uuid,
    /// The module to edit.
    pub module_key: ModuleKey,
    /// Field values to set; `None` or blank removes a field.
    pub updates: FieldUpdates,
}

impl Command for UpdateModuleFields {
    fn command_type(&self) -> &'static str {
        "worlds.update_module_fields"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Uuid {
        self.editor_id
    }
}

/// Command to publish a world.
#[derive(Debug, Clone)]
pub struct PublishWorld {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The publishing user.
    pub requested_by: Uuid,
    /// The world to publish.
    pub world_id: Uuid,
}

impl Command for PublishWorld {
    fn command_type(&self) -> &'static str {
        "worlds.publish_world"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Uuid {
        self.requested_by
    }
}

/// Command to requeue the failed generation of one module.
#[derive(Debug, Clone)]
pub struct RetryModule {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user asking for the retry.
    pub requested_by: Uuid,
    /// The world that owns the module.
    pub world_id: Uuid,
    /// The module to regenerate.
    pub module_key: ModuleKey,
}

impl Command for RetryModule {
    fn command_type(&self) -> &'static str {
        "worlds.retry_module"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Uuid {
        self.requested_by
    }
}
