//! Generation job queue and scheduler.
//!
//! Each publish round seeds one job per module to generate. Scheduler
//! instances poll the queue on a fixed interval; the store's claim hands every
//! waiting job to exactly one instance and commits the `RUNNING` transition
//! before the slow provider call starts, so any number of instances can drain
//! the queue side by side.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use worldforge_core::clock::Clock;
use worldforge_core::command::Command;
use worldforge_core::error::DomainError;

use crate::application::command_handlers::{require_module, require_world};
use crate::application::context::build_generation_context;
use crate::domain::commands::RetryModule;
use crate::domain::generation::{
    CredentialsLookup, CredentialsProvider, GenerationError, PromptRenderer, TextGenerator,
};
use crate::domain::job::{JobStatus, WorldGenerationJob};
use crate::domain::module::{ModuleStatus, WorldModule};
use crate::domain::registry::is_blank;
use crate::domain::repository::{ClaimedJob, JobRepository, WorldStores};
use crate::domain::world::{World, WorldStatus};

/// Default bound on persisted job error text, in characters.
pub const DEFAULT_MAX_ERROR_LENGTH: usize = 400;

/// Default age after which a `RUNNING` job is considered abandoned.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 900;

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Maximum characters of error text stored on a failed job.
    pub max_error_length: usize,
    /// Age after which a `RUNNING` job is requeued.
    pub stale_after: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_error_length: DEFAULT_MAX_ERROR_LENGTH,
            stale_after: chrono::Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

/// The collaborators that produce narrative text.
#[derive(Clone)]
pub struct GenerationPorts {
    /// Resolves the owner's provider settings.
    pub credentials: Arc<dyn CredentialsProvider>,
    /// Renders module prompts.
    pub renderer: Arc<dyn PromptRenderer>,
    /// Calls the provider.
    pub generator: Arc<dyn TextGenerator>,
}

/// What one `process_queue` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTick {
    /// No job was waiting.
    Idle,
    /// A job whose world no longer exists was marked failed.
    Orphaned(Uuid),
    /// A job was executed and ended in the given status.
    Executed {
        /// The executed job.
        job_id: Uuid,
        /// Its final status.
        status: JobStatus,
    },
}

/// Builds a round's job set: one `WAITING` job per module, sequenced 1..N
/// in the order given.
#[must_use]
pub fn plan_jobs(
    world: &World,
    modules: &[WorldModule],
    now: DateTime<Utc>,
) -> Vec<WorldGenerationJob> {
    (1_i32..)
        .zip(modules)
        .map(|(sequence, module)| {
            WorldGenerationJob::waiting(world.id, module.module_key, sequence, now)
        })
        .collect()
}

/// Replaces every job of `world` with a fresh `WAITING` set for `modules`.
/// Re-seeding never merges with an earlier set.
///
/// # Errors
///
/// Returns the repository's error if persistence fails.
pub async fn initialize_jobs(
    world: &World,
    modules: &[WorldModule],
    jobs: &dyn JobRepository,
    clock: &dyn Clock,
) -> Result<Vec<WorldGenerationJob>, DomainError> {
    let planned = plan_jobs(world, modules, clock.now());
    jobs.replace_jobs(world.id, &planned).await?;
    debug!(world_id = %world.id, jobs = planned.len(), "job queue seeded");
    Ok(planned)
}

/// Drains the generation job queue.
pub struct GenerationScheduler {
    stores: WorldStores,
    ports: GenerationPorts,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl GenerationScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        stores: WorldStores,
        ports: GenerationPorts,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            stores,
            ports,
            clock,
            config,
        }
    }

    /// Runs `tick` every `interval` until `cancel` fires. Errors are logged
    /// and never stop the loop.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?interval, "generation scheduler started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("generation scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }

    /// Requeues abandoned jobs, then processes at most one queued job.
    ///
    /// # Errors
    ///
    /// Returns persistence and integrity errors. Generation failures are
    /// recorded on the job instead.
    pub async fn tick(&self) -> Result<QueueTick, DomainError> {
        self.requeue_stale_jobs().await?;
        self.process_queue().await
    }

    /// Claims the oldest waiting job and executes it.
    ///
    /// # Errors
    ///
    /// Returns persistence and integrity errors.
    pub async fn process_queue(&self) -> Result<QueueTick, DomainError> {
        let claimed = self
            .stores
            .jobs
            .claim_next_job(self.clock.now(), self.config.max_error_length)
            .await?;
        match claimed {
            None => Ok(QueueTick::Idle),
            Some(ClaimedJob::Orphaned(job)) => {
                warn!(job_id = %job.id, world_id = %job.world_id, "job world missing; job failed");
                Ok(QueueTick::Orphaned(job.id))
            }
            Some(ClaimedJob::Ready { job, world }) => {
                let job = self.execute_job(job, world).await?;
                Ok(QueueTick::Executed {
                    job_id: job.id,
                    status: job.status,
                })
            }
        }
    }

    /// Generates the module of an already claimed (`RUNNING`) job and
    /// records the outcome on the job, the module and, once the round is
    /// drained, the world. Finalization is evaluated after failures too.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Integrity` if the job's module row is missing
    /// (the job is marked failed first) and persistence errors.
    #[instrument(skip_all, fields(job_id = %job.id, world_id = %world.id, module_key = %job.module_key))]
    pub async fn execute_job(
        &self,
        mut job: WorldGenerationJob,
        world: World,
    ) -> Result<WorldGenerationJob, DomainError> {
        let modules = self.stores.modules.list_modules(world.id).await?;
        let Some(mut module) = modules
            .iter()
            .find(|module| module.module_key == job.module_key)
            .cloned()
        else {
            let message = format!("world {} has no '{}' module", world.id, job.module_key);
            job.fail(&message, self.config.max_error_length, self.clock.now());
            self.stores.jobs.update_job(&job).await?;
            self.finalize_world_if_needed(world.id).await?;
            return Err(DomainError::Integrity(message));
        };

        match self.generate(&world, &module, &modules).await {
            Ok(content) => {
                let now = self.clock.now();
                self.store_completion(&mut module, content, now).await?;
                job.succeed(now);
                self.stores.jobs.update_job(&job).await?;
                info!(attempts = job.attempts, "module generated");
            }
            Err(e) => {
                let now = self.clock.now();
                job.fail(&e.to_string(), self.config.max_error_length, now);
                self.stores.jobs.update_job(&job).await?;
                module.mark_failed(now);
                match self.stores.modules.update_module(&mut module).await {
                    Ok(()) | Err(DomainError::ConcurrencyConflict { .. }) => {}
                    Err(e) => return Err(e),
                }
                warn!(
                    attempts = job.attempts,
                    error = job.last_error.as_deref().unwrap_or_default(),
                    "module generation failed"
                );
            }
        }

        self.finalize_world_if_needed(world.id).await?;
        Ok(job)
    }

    async fn generate(
        &self,
        world: &World,
        module: &WorldModule,
        modules: &[WorldModule],
    ) -> Result<String, GenerationError> {
        let credentials = match self.ports.credentials.resolve(world.owner_id).await {
            CredentialsLookup::Configured(credentials) => credentials,
            CredentialsLookup::Unconfigured => {
                return Err(GenerationError::Credentials(format!(
                    "no generation provider configured for owner {}",
                    world.owner_id
                )));
            }
            CredentialsLookup::Invalid(reason) => {
                return Err(GenerationError::Credentials(reason));
            }
        };

        let context = build_generation_context(world, module, modules);
        let prompt = self.ports.renderer.render(module.module_key, &context)?;
        let content = self.ports.generator.generate(&prompt, &credentials).await?;
        if is_blank(&content) {
            return Err(GenerationError::EmptyResult);
        }
        Ok(content)
    }

    /// Writes generated text. If the module was edited while generating,
    /// the text is kept but the status chosen by the edit wins.
    async fn store_completion(
        &self,
        module: &mut WorldModule,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut completed = module.clone();
        completed.complete_generation(content.clone(), now);
        match self.stores.modules.update_module(&mut completed).await {
            Ok(()) => {
                *module = completed;
                Ok(())
            }
            Err(DomainError::ConcurrencyConflict { .. }) => {
                warn!("module changed during generation; keeping its current status");
                let mut current =
                    require_module(self.stores.modules.as_ref(), module.world_id, module.module_key)
                        .await?;
                current.store_generated_content(content, now);
                self.stores.modules.update_module(&mut current).await?;
                *module = current;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Activates the world once none of its jobs is waiting or running.
    /// Failed jobs do not hold finalization back.
    ///
    /// # Errors
    ///
    /// Returns persistence errors.
    pub async fn finalize_world_if_needed(
        &self,
        world_id: Uuid,
    ) -> Result<Option<World>, DomainError> {
        let Some(world) = self
            .stores
            .worlds
            .finalize_if_drained(world_id, self.clock.now())
            .await?
        else {
            return Ok(None);
        };

        let failed: Vec<String> = self
            .stores
            .jobs
            .list_jobs(world_id)
            .await?
            .into_iter()
            .filter(|job| job.status == JobStatus::Failed)
            .map(|job| job.module_key.to_string())
            .collect();
        if failed.is_empty() {
            info!(%world_id, version = world.version, "world published");
        } else {
            warn!(
                %world_id,
                version = world.version,
                failed_modules = ?failed,
                "world published with failed modules"
            );
        }
        Ok(Some(world))
    }

    /// Requeues the failed job of one module.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown world,
    /// `DomainError::Conflict` when the module has no job or its job is not
    /// `FAILED`, and `DomainError::Integrity` if the module row is missing.
    /// Nothing is written on error.
    #[instrument(skip_all, fields(world_id = %command.world_id, module_key = %command.module_key))]
    pub async fn retry_module(
        &self,
        command: &RetryModule,
    ) -> Result<WorldGenerationJob, DomainError> {
        let mut world = require_world(self.stores.worlds.as_ref(), command.world_id).await?;
        let mut job = self
            .stores
            .jobs
            .find_job(command.world_id, command.module_key)
            .await?
            .ok_or_else(|| {
                DomainError::Conflict(format!(
                    "module '{}' has no generation job to retry",
                    command.module_key
                ))
            })?;
        let now = self.clock.now();
        job.reset_for_retry(now)?;
        let mut module =
            require_module(self.stores.modules.as_ref(), command.world_id, command.module_key)
                .await?;

        // The job becomes claimable last, after the module and world are in
        // their generating states.
        module.mark_awaiting_generation(now);
        self.stores.modules.update_module(&mut module).await?;
        if world.status != WorldStatus::Generating {
            world.begin_generation(now);
            self.stores.worlds.update_world(&mut world).await?;
        }
        self.stores.jobs.update_job(&job).await?;

        info!(
            correlation_id = %command.correlation_id(),
            attempts = job.attempts,
            "module generation requeued"
        );
        Ok(job)
    }

    /// Requeues jobs left `RUNNING` longer than the configured threshold,
    /// putting their modules back to `AWAITING_GENERATION`.
    ///
    /// # Errors
    ///
    /// Returns persistence errors.
    pub async fn requeue_stale_jobs(&self) -> Result<usize, DomainError> {
        let cutoff = self.clock.cutoff(self.config.stale_after);
        let requeued = self
            .stores
            .jobs
            .requeue_stale_jobs(cutoff, self.clock.now())
            .await?;

        for job in &requeued {
            warn!(job_id = %job.id, world_id = %job.world_id, module_key = %job.module_key, "stale job requeued");
            let Some(mut module) = self
                .stores
                .modules
                .find_module(job.world_id, job.module_key)
                .await?
            else {
                continue;
            };
            if module.status != ModuleStatus::AwaitingGeneration {
                module.mark_awaiting_generation(self.clock.now());
                self.stores.modules.update_module(&mut module).await?;
            }
        }
        Ok(requeued.len())
    }
}

impl std::fmt::Debug for GenerationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_plan_jobs_sequences_from_one_in_given_order() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let world = World::new(Uuid::new_v4(), Uuid::new_v4(), "Aldmere".to_owned(), now);
        let modules: Vec<WorldModule> = [
            crate::domain::registry::ModuleKey::Peoples,
            crate::domain::registry::ModuleKey::Conflicts,
        ]
        .into_iter()
        .map(|key| WorldModule::new_empty(world.id, key, now))
        .collect();

        let jobs = plan_jobs(&world, &modules, now);

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].sequence, 1);
        assert_eq!(jobs[0].module_key, modules[0].module_key);
        assert_eq!(jobs[1].sequence, 2);
        assert!(jobs.iter().all(|job| job.status == JobStatus::Waiting));
        assert!(jobs.iter().all(|job| job.attempts == 0));
    }
}
