//! Query handlers for the world generation context.
//!
//! Read-only view DTOs over the stored world, module and job rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use worldforge_core::error::DomainError;

use crate::application::command_handlers::require_world;
use crate::domain::job::{JobStatus, WorldGenerationJob};
use crate::domain::module::{ModuleStatus, WorldModule};
use crate::domain::registry::{FieldMap, ModuleKey};
use crate::domain::repository::WorldStores;
use crate::domain::world::{World, WorldStatus};

/// Read-only view of one module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleView {
    /// Registry key.
    pub module_key: ModuleKey,
    /// Display label.
    pub label: &'static str,
    /// Current status.
    pub status: ModuleStatus,
    /// Authored fields.
    pub fields: FieldMap,
    /// Generated narrative text.
    pub full_content: Option<String>,
    /// When the narrative text was last written.
    pub full_content_updated_at: Option<DateTime<Utc>>,
    /// Write counter.
    pub revision: i64,
    /// Who last edited the fields.
    pub last_edited_by: Option<Uuid>,
    /// When the fields were last edited.
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl From<&WorldModule> for ModuleView {
    fn from(module: &WorldModule) -> Self {
        Self {
            module_key: module.module_key,
            label: module.definition().label,
            status: module.status,
            fields: module.fields.clone(),
            full_content: module.full_content.clone(),
            full_content_updated_at: module.full_content_updated_at,
            revision: module.revision,
            last_edited_by: module.last_edited_by,
            last_edited_at: module.last_edited_at,
        }
    }
}

/// Read-only view of a world with its modules.
#[derive(Debug, Clone, Serialize)]
pub struct WorldView {
    /// The world identifier.
    pub world_id: Uuid,
    /// The owning author.
    pub owner_id: Uuid,
    /// Display name.
    pub name: String,
    /// One-line pitch.
    pub tagline: Option<String>,
    /// Ordered themes.
    pub themes: Vec<String>,
    /// Creative intent.
    pub creative_intent: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Lifecycle status.
    pub status: WorldStatus,
    /// Number of completed publications.
    pub version: i64,
    /// When the last publication completed.
    pub published_at: Option<DateTime<Utc>>,
    /// Who last changed module content.
    pub last_edited_by: Option<Uuid>,
    /// When module content last changed.
    pub last_edited_at: Option<DateTime<Utc>>,
    /// Modules in registry order.
    pub modules: Vec<ModuleView>,
}

impl WorldView {
    /// Builds the view from a world and its modules.
    #[must_use]
    pub fn new(world: World, modules: &[WorldModule]) -> Self {
        Self {
            world_id: world.id,
            owner_id: world.owner_id,
            name: world.name,
            tagline: world.tagline,
            themes: world.themes,
            creative_intent: world.creative_intent,
            notes: world.notes,
            status: world.status,
            version: world.version,
            published_at: world.published_at,
            last_edited_by: world.last_edited_by,
            last_edited_at: world.last_edited_at,
            modules: modules.iter().map(ModuleView::from).collect(),
        }
    }
}

/// Read-only view of one generation job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    /// The generated module.
    pub module_key: ModuleKey,
    /// Display label of the module.
    pub module_label: &'static str,
    /// Dispatch order.
    pub sequence: i32,
    /// Current status.
    pub status: JobStatus,
    /// Attempts so far.
    pub attempts: i32,
    /// Start of the current or last attempt.
    pub started_at: Option<DateTime<Utc>>,
    /// End of the last attempt.
    pub finished_at: Option<DateTime<Utc>>,
    /// Error of the last failed attempt.
    pub last_error: Option<String>,
}

impl From<&WorldGenerationJob> for JobView {
    fn from(job: &WorldGenerationJob) -> Self {
        Self {
            module_key: job.module_key,
            module_label: job.module_key.definition().label,
            sequence: job.sequence,
            status: job.status,
            attempts: job.attempts,
            started_at: job.started_at,
            finished_at: job.finished_at,
            last_error: job.last_error.clone(),
        }
    }
}

/// Progress of the current or last publish round.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationStatusView {
    /// The world identifier.
    pub world_id: Uuid,
    /// Lifecycle status.
    pub status: WorldStatus,
    /// Number of completed publications.
    pub version: i64,
    /// When the last publication completed.
    pub published_at: Option<DateTime<Utc>>,
    /// Jobs ordered by sequence.
    pub jobs: Vec<JobView>,
    /// Modules whose job is `FAILED`.
    pub failed_modules: Vec<ModuleKey>,
    /// Whether any job is `FAILED`.
    pub has_failures: bool,
}

/// Retrieves a world with its modules.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for an unknown world.
pub async fn get_world(world_id: Uuid, stores: &WorldStores) -> Result<WorldView, DomainError> {
    let world = require_world(stores.worlds.as_ref(), world_id).await?;
    let modules = stores.modules.list_modules(world_id).await?;
    Ok(WorldView::new(world, &modules))
}

/// Retrieves the job progress of a world.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for an unknown world.
pub async fn get_generation_status(
    world_id: Uuid,
    stores: &WorldStores,
) -> Result<GenerationStatusView, DomainError> {
    let world = require_world(stores.worlds.as_ref(), world_id).await?;
    let jobs = stores.jobs.list_jobs(world_id).await?;
    let failed_modules: Vec<ModuleKey> = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Failed)
        .map(|job| job.module_key)
        .collect();

    Ok(GenerationStatusView {
        world_id,
        status: world.status,
        version: world.version,
        published_at: world.published_at,
        jobs: jobs.iter().map(JobView::from).collect(),
        has_failures: !failed_modules.is_empty(),
        failed_modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_view_carries_module_label() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut job = WorldGenerationJob::waiting(Uuid::new_v4(), ModuleKey::Cultures, 3, now);
        job.start(now);
        job.fail("upstream timeout", 400, now);

        let view = JobView::from(&job);

        assert_eq!(view.module_label, ModuleKey::Cultures.definition().label);
        assert_eq!(view.sequence, 3);
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.last_error.as_deref(), Some("upstream timeout"));
    }

    #[test]
    fn test_world_view_keeps_module_order() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let world = World::new(Uuid::new_v4(), Uuid::new_v4(), "Aldmere".to_owned(), now);
        let modules: Vec<WorldModule> = ModuleKey::ALL
            .into_iter()
            .map(|key| WorldModule::new_empty(world.id, key, now))
            .collect();

        let view = WorldView::new(world, &modules);

        let keys: Vec<ModuleKey> = view.modules.iter().map(|m| m.module_key).collect();
        assert_eq!(keys, ModuleKey::ALL.to_vec());
        assert_eq!(view.status, WorldStatus::Draft);
    }
}
