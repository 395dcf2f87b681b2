//! Command handlers for world authoring.
//!
//! This module contains application-level command handler functions that
//! orchestrate domain logic: load state, apply the command, persist.

use tracing::{debug, info};
use uuid::Uuid;
use worldforge_core::clock::Clock;
use worldforge_core::command::Command;
use worldforge_core::error::DomainError;

use crate::domain::commands::{CreateWorld, UpdateModuleFields};
use crate::domain::content_hash::{compute_content_hash, determine_status};
use crate::domain::module::WorldModule;
use crate::domain::registry::{ModuleKey, is_blank};
use crate::domain::repository::{ModuleRepository, WorldRepository};
use crate::domain::world::World;

/// Result of a module field update.
#[derive(Debug, Clone)]
pub struct ModuleEditOutcome {
    /// The module after the update.
    pub module: WorldModule,
    /// The owning world after the update.
    pub world: World,
    /// Whether the field map changed at all. When false nothing was written.
    pub applied: bool,
    /// Whether the content hash changed.
    pub content_changed: bool,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .filter(|text| !is_blank(text))
        .map(|text| text.trim().to_owned())
}

/// Loads a module that must exist for the world.
///
/// # Errors
///
/// Returns `DomainError::Integrity` if the module is missing.
pub(crate) async fn require_module(
    modules: &dyn ModuleRepository,
    world_id: Uuid,
    module_key: ModuleKey,
) -> Result<WorldModule, DomainError> {
    modules
        .find_module(world_id, module_key)
        .await?
        .ok_or_else(|| {
            DomainError::Integrity(format!("world {world_id} has no '{module_key}' module"))
        })
}

/// Loads a world that must exist.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the world is missing.
pub(crate) async fn require_world(
    worlds: &dyn WorldRepository,
    world_id: Uuid,
) -> Result<World, DomainError> {
    worlds
        .find_world(world_id)
        .await?
        .ok_or_else(|| DomainError::world_not_found(world_id))
}

/// Handles the `CreateWorld` command: creates a draft world and one empty
/// module per registry key.
///
/// This is a creation command: the handler generates the `world_id`.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the name is blank, or the
/// repository's error if persistence fails.
pub async fn handle_create_world(
    command: &CreateWorld,
    clock: &dyn Clock,
    worlds: &dyn WorldRepository,
) -> Result<World, DomainError> {
    if is_blank(&command.name) {
        return Err(DomainError::Validation("world name must not be empty".into()));
    }

    let now = clock.now();
    let mut world = World::new(
        Uuid::new_v4(),
        command.owner_id,
        command.name.trim().to_owned(),
        now,
    );
    world.tagline = non_blank(command.tagline.as_ref());
    world.creative_intent = non_blank(command.creative_intent.as_ref());
    world.notes = non_blank(command.notes.as_ref());
    world.themes = command
        .themes
        .iter()
        .filter(|theme| !is_blank(theme))
        .map(|theme| theme.trim().to_owned())
        .collect();

    let modules: Vec<WorldModule> = ModuleKey::ALL
        .into_iter()
        .map(|key| WorldModule::new_empty(world.id, key, now))
        .collect();

    worlds.create_world(&world, &modules).await?;

    info!(
        correlation_id = %command.correlation_id(),
        world_id = %world.id,
        "world created"
    );
    Ok(world)
}

/// Handles the `UpdateModuleFields` command: applies the partial update,
/// recomputes the content hash and status, and marks the world edited when
/// the content changed.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for an unknown world,
/// `DomainError::Conflict` while the world is generating,
/// `DomainError::Validation` for bad field keys or lengths,
/// `DomainError::Integrity` if the module row is missing, and
/// `DomainError::ConcurrencyConflict` if the module or its world changed
/// concurrently.
pub async fn handle_update_module_fields(
    command: &UpdateModuleFields,
    clock: &dyn Clock,
    worlds: &dyn WorldRepository,
    modules: &dyn ModuleRepository,
) -> Result<ModuleEditOutcome, DomainError> {
    let mut world = require_world(worlds, command.world_id).await?;
    world.ensure_not_generating("edit modules")?;
    let mut module = require_module(modules, command.world_id, command.module_key).await?;

    if command.updates.is_empty() || !module.apply_field_updates(&command.updates)? {
        debug!(
            world_id = %command.world_id,
            module_key = %command.module_key,
            "field update produced no change"
        );
        return Ok(ModuleEditOutcome {
            module,
            world,
            applied: false,
            content_changed: false,
        });
    }

    let now = clock.now();
    let new_hash = compute_content_hash(&module.fields);
    let content_changed = new_hash != module.content_hash;
    module.content_hash = new_hash;
    module.status = determine_status(&world, module.module_key, &module.fields, content_changed);
    module.last_edited_by = Some(command.actor_id());
    module.last_edited_at = Some(now);
    module.updated_at = now;
    if content_changed {
        world.mark_edited(command.actor_id(), now);
    }
    // The world row is written even when unchanged, so a publish that
    // started after the read fails this edit instead of being overwritten.
    worlds.commit_module_edit(&mut world, &mut module).await?;

    info!(
        correlation_id = %command.correlation_id(),
        world_id = %world.id,
        module_key = %module.module_key,
        status = %module.status,
        content_changed,
        "module fields updated"
    );
    Ok(ModuleEditOutcome {
        module,
        world,
        applied: true,
        content_changed,
    })
}
