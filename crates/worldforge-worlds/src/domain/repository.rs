//! Persistence ports for worlds, modules and generation jobs.
//!
//! Implementations live outside this crate: `worldforge-store` for
//! PostgreSQL and `worldforge-test-support` for in-memory tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use worldforge_core::error::DomainError;

use super::job::WorldGenerationJob;
use super::module::WorldModule;
use super::registry::ModuleKey;
use super::world::World;

/// Everything a publish round writes, persisted as one unit of work.
#[derive(Debug, Clone)]
pub struct GenerationRound {
    /// The world, already in `GENERATING`, carrying its expected revision.
    pub world: World,
    /// Modules moved to `AWAITING_GENERATION`, carrying their expected revision.
    pub modules: Vec<WorldModule>,
    /// The fresh job set replacing any earlier round.
    pub jobs: Vec<WorldGenerationJob>,
}

/// Result of claiming the next queued job.
#[derive(Debug, Clone)]
pub enum ClaimedJob {
    /// The job is now `RUNNING` and its world was loaded.
    Ready {
        /// The claimed job.
        job: WorldGenerationJob,
        /// The job's world.
        world: World,
    },
    /// The job's world no longer exists; the job was marked `FAILED`.
    Orphaned(WorldGenerationJob),
}

/// Repository for world rows.
#[async_trait]
pub trait WorldRepository: Send + Sync {
    /// Inserts a world together with its modules.
    async fn create_world(&self, world: &World, modules: &[WorldModule])
    -> Result<(), DomainError>;

    /// Loads a world by ID.
    async fn find_world(&self, world_id: Uuid) -> Result<Option<World>, DomainError>;

    /// Writes a world if its stored revision still equals `world.revision`,
    /// then advances `world.revision`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when another writer got
    /// there first.
    async fn update_world(&self, world: &mut World) -> Result<(), DomainError>;

    /// Persists an edited module together with its world, both revision
    /// checked, all or nothing. Advances both revisions.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if either row changed since
    /// it was read, for instance because a publish round started.
    async fn commit_module_edit(
        &self,
        world: &mut World,
        module: &mut WorldModule,
    ) -> Result<(), DomainError>;

    /// Persists a publish round: the world row and module status changes
    /// (all revision checked) and the replaced job set, all or nothing.
    /// Advances the revisions held by `round`.
    async fn commit_generation_round(&self, round: &mut GenerationRound)
    -> Result<(), DomainError>;

    /// Activates a `GENERATING` world whose jobs are all finished, bumping
    /// its version and revision. Returns the updated world, or `None` when
    /// jobs are still waiting or running or the world is not `GENERATING`.
    async fn finalize_if_drained(
        &self,
        world_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<World>, DomainError>;
}

/// Repository for module rows.
#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Loads every module of a world, in registry order.
    async fn list_modules(&self, world_id: Uuid) -> Result<Vec<WorldModule>, DomainError>;

    /// Loads a module by its natural key.
    async fn find_module(
        &self,
        world_id: Uuid,
        module_key: ModuleKey,
    ) -> Result<Option<WorldModule>, DomainError>;

    /// Writes a module if its stored revision still equals
    /// `module.revision`, then advances `module.revision`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` when another writer got
    /// there first.
    async fn update_module(&self, module: &mut WorldModule) -> Result<(), DomainError>;
}

/// The generation job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Deletes every job of `world_id` and inserts `jobs`, all or nothing.
    async fn replace_jobs(
        &self,
        world_id: Uuid,
        jobs: &[WorldGenerationJob],
    ) -> Result<(), DomainError>;

    /// Loads every job of a world ordered by sequence.
    async fn list_jobs(&self, world_id: Uuid) -> Result<Vec<WorldGenerationJob>, DomainError>;

    /// Loads the job of one module.
    async fn find_job(
        &self,
        world_id: Uuid,
        module_key: ModuleKey,
    ) -> Result<Option<WorldGenerationJob>, DomainError>;

    /// Overwrites a job row.
    async fn update_job(&self, job: &WorldGenerationJob) -> Result<(), DomainError>;

    /// Claims the oldest `WAITING` job across all worlds (by sequence, then
    /// ID) and marks it `RUNNING`, committing before returning. A job whose
    /// world is gone is failed instead, its error cut to `max_error_length`.
    ///
    /// Concurrent callers never receive the same job and never wait on a
    /// job another caller is claiming.
    async fn claim_next_job(
        &self,
        now: DateTime<Utc>,
        max_error_length: usize,
    ) -> Result<Option<ClaimedJob>, DomainError>;

    /// Moves jobs `RUNNING` since before `cutoff` back to `WAITING` and
    /// returns them.
    async fn requeue_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorldGenerationJob>, DomainError>;
}

/// Shared handles to the three repositories.
#[derive(Clone)]
pub struct WorldStores {
    /// World repository.
    pub worlds: Arc<dyn WorldRepository>,
    /// Module repository.
    pub modules: Arc<dyn ModuleRepository>,
    /// Job repository.
    pub jobs: Arc<dyn JobRepository>,
}

impl WorldStores {
    /// Uses one store for all three ports.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: WorldRepository + ModuleRepository + JobRepository + 'static,
    {
        Self {
            worlds: store.clone(),
            modules: store.clone(),
            jobs: store,
        }
    }
}

impl std::fmt::Debug for WorldStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldStores").finish_non_exhaustive()
    }
}
