//! Publication analysis and the publish command.
//!
//! Publishing reconciles every module of a world against its publication
//! history: modules whose inputs are new or changed are scheduled for
//! generation, completed ones are reused as they are.

use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;
use worldforge_core::clock::Clock;
use worldforge_core::command::Command;
use worldforge_core::error::{DomainError, MissingFields};

use crate::application::command_handlers::require_world;
use crate::application::scheduler::plan_jobs;
use crate::domain::commands::PublishWorld;
use crate::domain::job::WorldGenerationJob;
use crate::domain::module::{ModuleStatus, WorldModule};
use crate::domain::registry::{ModuleKey, module_definitions};
use crate::domain::repository::{GenerationRound, WorldStores};
use crate::domain::world::World;

/// What a publish would do right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationPreview {
    /// The analyzed world.
    pub world_id: Uuid,
    /// Required fields still blank, per module. Modules with nothing
    /// missing are absent.
    pub missing_fields: MissingFields,
    /// Modules a publish would generate, in registry order.
    pub modules_to_generate: Vec<ModuleKey>,
    /// Completed modules a publish would keep as they are.
    pub modules_to_reuse: Vec<ModuleKey>,
}

/// Result of a publish request.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// The world after the request.
    pub world: World,
    /// The seeded jobs. Empty when the world was finalized immediately.
    pub jobs: Vec<WorldGenerationJob>,
    /// Modules left untouched.
    pub modules_to_reuse: Vec<ModuleKey>,
}

/// Whether a publish of `world` should (re)generate `module`.
#[must_use]
pub fn should_generate(world: &World, module: &WorldModule) -> bool {
    if world.is_published() {
        matches!(
            module.status,
            ModuleStatus::AwaitingGeneration | ModuleStatus::Ready | ModuleStatus::Failed
        )
    } else {
        matches!(
            module.status,
            ModuleStatus::Ready | ModuleStatus::AwaitingGeneration
        )
    }
}

/// Whether a publish of `world` reuses `module` without generation.
fn should_reuse(world: &World, module: &WorldModule) -> bool {
    world.is_published() && module.status == ModuleStatus::Completed
}

/// Analyzes a world's modules in registry order.
///
/// # Errors
///
/// Returns `DomainError::Integrity` if a registry module has no row.
pub fn analyze(world: &World, modules: &[WorldModule]) -> Result<PublicationPreview, DomainError> {
    let mut preview = PublicationPreview {
        world_id: world.id,
        missing_fields: MissingFields::new(),
        modules_to_generate: Vec::new(),
        modules_to_reuse: Vec::new(),
    };

    for definition in module_definitions() {
        let module = modules
            .iter()
            .find(|module| module.module_key == definition.key)
            .ok_or_else(|| {
                DomainError::Integrity(format!(
                    "world {} has no '{}' module",
                    world.id, definition.key
                ))
            })?;

        let missing = definition.missing_required(&module.fields);
        if !missing.is_empty() {
            preview
                .missing_fields
                .insert(definition.key.as_str().to_owned(), missing);
        }

        if should_generate(world, module) {
            preview.modules_to_generate.push(definition.key);
        } else if should_reuse(world, module) {
            preview.modules_to_reuse.push(definition.key);
        }
    }

    Ok(preview)
}

/// Read-only preview of what publishing would do.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for an unknown world and
/// `DomainError::Integrity` if a module row is missing.
pub async fn preview_publication(
    world_id: Uuid,
    stores: &WorldStores,
) -> Result<PublicationPreview, DomainError> {
    let world = require_world(stores.worlds.as_ref(), world_id).await?;
    let modules = stores.modules.list_modules(world_id).await?;
    analyze(&world, &modules)
}

/// Handles the `PublishWorld` command.
///
/// Nothing is written if the analysis rejects the publish. When nothing
/// needs generating the world is finalized at once; otherwise the affected
/// modules, a fresh job set and the `GENERATING` world are committed as one
/// round.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for an unknown world,
/// `DomainError::Conflict` while a round is already in flight,
/// `DomainError::MissingRequiredFields` when required fields are blank, and
/// persistence errors from the store.
#[instrument(skip_all, fields(world_id = %command.world_id, correlation_id = %command.correlation_id()))]
pub async fn handle_publish_world(
    command: &PublishWorld,
    clock: &dyn Clock,
    stores: &WorldStores,
) -> Result<PublishOutcome, DomainError> {
    let mut world = require_world(stores.worlds.as_ref(), command.world_id).await?;
    world.ensure_not_generating("publish")?;

    let modules = stores.modules.list_modules(world.id).await?;
    let preview = analyze(&world, &modules)?;
    if !preview.missing_fields.is_empty() {
        return Err(DomainError::MissingRequiredFields(preview.missing_fields));
    }

    let now = clock.now();
    if preview.modules_to_generate.is_empty() {
        world.finalize_publication(now);
        stores.worlds.update_world(&mut world).await?;
        info!(version = world.version, "nothing to generate; world finalized");
        return Ok(PublishOutcome {
            world,
            jobs: Vec::new(),
            modules_to_reuse: preview.modules_to_reuse,
        });
    }

    let mut to_generate: Vec<WorldModule> = preview
        .modules_to_generate
        .iter()
        .filter_map(|key| modules.iter().find(|module| module.module_key == *key).cloned())
        .collect();
    for module in &mut to_generate {
        module.mark_awaiting_generation(now);
    }
    world.begin_generation(now);
    let jobs = plan_jobs(&world, &to_generate, now);

    let mut round = GenerationRound {
        world,
        modules: to_generate,
        jobs,
    };
    stores.worlds.commit_generation_round(&mut round).await?;

    info!(
        jobs = round.jobs.len(),
        reused = preview.modules_to_reuse.len(),
        "publish round scheduled"
    );
    Ok(PublishOutcome {
        world: round.world,
        jobs: round.jobs,
        modules_to_reuse: preview.modules_to_reuse,
    })
}
