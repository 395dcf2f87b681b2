//! Test stores: in-memory implementations of the world repositories.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use worldforge_core::error::DomainError;
use worldforge_worlds::domain::job::{JobStatus, WorldGenerationJob};
use worldforge_worlds::domain::module::WorldModule;
use worldforge_worlds::domain::registry::ModuleKey;
use worldforge_worlds::domain::repository::{
    ClaimedJob, GenerationRound, JobRepository, ModuleRepository, WorldRepository,
};
use worldforge_worlds::domain::world::{World, WorldStatus};

#[derive(Debug, Default)]
struct State {
    worlds: HashMap<Uuid, World>,
    modules: HashMap<(Uuid, ModuleKey), WorldModule>,
    jobs: Vec<WorldGenerationJob>,
    writes: usize,
}

impl State {
    fn check_world_revision(&self, world: &World) -> Result<(), DomainError> {
        let stored = self
            .worlds
            .get(&world.id)
            .ok_or_else(|| DomainError::world_not_found(world.id))?;
        if stored.revision != world.revision {
            return Err(DomainError::ConcurrencyConflict {
                entity: "world",
                id: world.id,
                expected: world.revision,
                actual: stored.revision,
            });
        }
        Ok(())
    }

    fn store_world(&mut self, world: &World) -> World {
        let mut stored = world.clone();
        stored.revision += 1;
        self.worlds.insert(stored.id, stored.clone());
        self.writes += 1;
        stored
    }

    fn check_revision(&self, module: &WorldModule) -> Result<(), DomainError> {
        let stored = self
            .modules
            .get(&(module.world_id, module.module_key))
            .ok_or(DomainError::NotFound {
                entity: "world_module",
                id: module.id,
            })?;
        if stored.revision != module.revision {
            return Err(DomainError::ConcurrencyConflict {
                entity: "world_module",
                id: module.id,
                expected: module.revision,
                actual: stored.revision,
            });
        }
        Ok(())
    }

    fn store_module(&mut self, module: &WorldModule) -> WorldModule {
        let mut stored = module.clone();
        stored.revision += 1;
        self.modules
            .insert((stored.world_id, stored.module_key), stored.clone());
        self.writes += 1;
        stored
    }
}

/// A store that keeps worlds, modules and jobs in memory behind one mutex,
/// so every repository call is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct InMemoryWorldStore {
    state: Mutex<State>,
}

impl InMemoryWorldStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of world, module and job writes so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Snapshot of a world's jobs ordered by sequence.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn jobs_of(&self, world_id: Uuid) -> Vec<WorldGenerationJob> {
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<WorldGenerationJob> = state
            .jobs
            .iter()
            .filter(|job| job.world_id == world_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.sequence);
        jobs
    }

    /// Snapshot of one module.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned or the module is unknown.
    pub fn module(&self, world_id: Uuid, module_key: ModuleKey) -> WorldModule {
        self.state.lock().unwrap().modules[&(world_id, module_key)].clone()
    }

    /// Snapshot of one world.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned or the world is unknown.
    pub fn world(&self, world_id: Uuid) -> World {
        self.state.lock().unwrap().worlds[&world_id].clone()
    }

    /// Deletes a world and its modules but leaves its jobs behind.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delete_world(&self, world_id: Uuid) {
        let mut state = self.state.lock().unwrap();
        state.worlds.remove(&world_id);
        state.modules.retain(|(owner, _), _| *owner != world_id);
    }

    /// Deletes a single module row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delete_module(&self, world_id: Uuid, module_key: ModuleKey) {
        self.state
            .lock()
            .unwrap()
            .modules
            .remove(&(world_id, module_key));
    }

    /// Overwrites a module row without a revision check.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_module(&self, module: WorldModule) {
        self.state
            .lock()
            .unwrap()
            .modules
            .insert((module.world_id, module.module_key), module);
    }

    /// Overwrites or inserts a job row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_job(&self, job: WorldGenerationJob) {
        let mut state = self.state.lock().unwrap();
        state.jobs.retain(|existing| existing.id != job.id);
        state.jobs.push(job);
    }
}

#[async_trait]
impl WorldRepository for InMemoryWorldStore {
    async fn create_world(
        &self,
        world: &World,
        modules: &[WorldModule],
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        if state.worlds.contains_key(&world.id) {
            return Err(DomainError::Conflict(format!("world {} already exists", world.id)));
        }
        state.worlds.insert(world.id, world.clone());
        for module in modules {
            state
                .modules
                .insert((module.world_id, module.module_key), module.clone());
        }
        state.writes += 1;
        Ok(())
    }

    async fn find_world(&self, world_id: Uuid) -> Result<Option<World>, DomainError> {
        Ok(self.state.lock().unwrap().worlds.get(&world_id).cloned())
    }

    async fn update_world(&self, world: &mut World) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.check_world_revision(world)?;
        *world = state.store_world(world);
        Ok(())
    }

    async fn commit_module_edit(
        &self,
        world: &mut World,
        module: &mut WorldModule,
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.check_world_revision(world)?;
        state.check_revision(module)?;
        *world = state.store_world(world);
        *module = state.store_module(module);
        Ok(())
    }

    async fn commit_generation_round(
        &self,
        round: &mut GenerationRound,
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.check_world_revision(&round.world)?;
        for module in &round.modules {
            state.check_revision(module)?;
        }

        round.world = state.store_world(&round.world);
        for module in &mut round.modules {
            *module = state.store_module(module);
        }
        state.jobs.retain(|job| job.world_id != round.world.id);
        state.jobs.extend(round.jobs.iter().cloned());
        Ok(())
    }

    async fn finalize_if_drained(
        &self,
        world_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<World>, DomainError> {
        let mut state = self.state.lock().unwrap();
        let drained = !state
            .jobs
            .iter()
            .any(|job| job.world_id == world_id && job.status.is_active());
        let Some(world) = state.worlds.get_mut(&world_id) else {
            return Ok(None);
        };
        if world.status != WorldStatus::Generating || !drained {
            return Ok(None);
        }
        world.finalize_publication(now);
        world.revision += 1;
        let finalized = world.clone();
        state.writes += 1;
        Ok(Some(finalized))
    }
}

#[async_trait]
impl ModuleRepository for InMemoryWorldStore {
    async fn list_modules(&self, world_id: Uuid) -> Result<Vec<WorldModule>, DomainError> {
        let state = self.state.lock().unwrap();
        Ok(ModuleKey::ALL
            .into_iter()
            .filter_map(|key| state.modules.get(&(world_id, key)).cloned())
            .collect())
    }

    async fn find_module(
        &self,
        world_id: Uuid,
        module_key: ModuleKey,
    ) -> Result<Option<WorldModule>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .modules
            .get(&(world_id, module_key))
            .cloned())
    }

    async fn update_module(&self, module: &mut WorldModule) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.check_revision(module)?;
        *module = state.store_module(module);
        Ok(())
    }
}

#[async_trait]
impl JobRepository for InMemoryWorldStore {
    async fn replace_jobs(
        &self,
        world_id: Uuid,
        jobs: &[WorldGenerationJob],
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.jobs.retain(|job| job.world_id != world_id);
        state.jobs.extend(jobs.iter().cloned());
        state.writes += 1;
        Ok(())
    }

    async fn list_jobs(&self, world_id: Uuid) -> Result<Vec<WorldGenerationJob>, DomainError> {
        Ok(self.jobs_of(world_id))
    }

    async fn find_job(
        &self,
        world_id: Uuid,
        module_key: ModuleKey,
    ) -> Result<Option<WorldGenerationJob>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|job| job.world_id == world_id && job.module_key == module_key)
            .cloned())
    }

    async fn update_job(&self, job: &WorldGenerationJob) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .jobs
            .iter_mut()
            .find(|existing| existing.id == job.id)
            .ok_or(DomainError::NotFound {
                entity: "world_generation_job",
                id: job.id,
            })?;
        *stored = job.clone();
        state.writes += 1;
        Ok(())
    }

    async fn claim_next_job(
        &self,
        now: DateTime<Utc>,
        max_error_length: usize,
    ) -> Result<Option<ClaimedJob>, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.status == JobStatus::Waiting)
            .min_by_key(|(_, job)| (job.sequence, job.id))
            .map(|(index, _)| index)
        else {
            return Ok(None);
        };

        let world = state.worlds.get(&state.jobs[index].world_id).cloned();
        let job = &mut state.jobs[index];
        job.start(now);
        let claimed = match world {
            Some(world) => ClaimedJob::Ready {
                job: job.clone(),
                world,
            },
            None => {
                let message = job.orphan_error();
                job.fail(&message, max_error_length, now);
                ClaimedJob::Orphaned(job.clone())
            }
        };
        state.writes += 1;
        Ok(Some(claimed))
    }

    async fn requeue_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorldGenerationJob>, DomainError> {
        let mut state = self.state.lock().unwrap();
        let mut requeued = Vec::new();
        for job in &mut state.jobs {
            let stale = job.status == JobStatus::Running
                && job.started_at.is_some_and(|started| started < cutoff);
            if stale {
                job.requeue_stale(now);
                requeued.push(job.clone());
            }
        }
        state.writes += requeued.len();
        Ok(requeued)
    }
}

/// A store whose every call fails with an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingWorldStore;

fn connection_refused() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

#[async_trait]
impl WorldRepository for FailingWorldStore {
    async fn create_world(&self, _world: &World, _modules: &[WorldModule]) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn find_world(&self, _world_id: Uuid) -> Result<Option<World>, DomainError> {
        Err(connection_refused())
    }

    async fn update_world(&self, _world: &mut World) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn commit_module_edit(
        &self,
        _world: &mut World,
        _module: &mut WorldModule,
    ) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn commit_generation_round(
        &self,
        _round: &mut GenerationRound,
    ) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn finalize_if_drained(
        &self,
        _world_id: Uuid,
        _now: DateTime<Utc>,
    ) -> Result<Option<World>, DomainError> {
        Err(connection_refused())
    }
}

#[async_trait]
impl ModuleRepository for FailingWorldStore {
    async fn list_modules(&self, _world_id: Uuid) -> Result<Vec<WorldModule>, DomainError> {
        Err(connection_refused())
    }

    async fn find_module(
        &self,
        _world_id: Uuid,
        _module_key: ModuleKey,
    ) -> Result<Option<WorldModule>, DomainError> {
        Err(connection_refused())
    }

    async fn update_module(&self, _module: &mut WorldModule) -> Result<(), DomainError> {
        Err(connection_refused())
    }
}

#[async_trait]
impl JobRepository for FailingWorldStore {
    async fn replace_jobs(
        &self,
        _world_id: Uuid,
        _jobs: &[WorldGenerationJob],
    ) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn list_jobs(&self, _world_id: Uuid) -> Result<Vec<WorldGenerationJob>, DomainError> {
        Err(connection_refused())
    }

    async fn find_job(
        &self,
        _world_id: Uuid,
        _module_key: ModuleKey,
    ) -> Result<Option<WorldGenerationJob>, DomainError> {
        Err(connection_refused())
    }

    async fn update_job(&self, _job: &WorldGenerationJob) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn claim_next_job(
        &self,
        _now: DateTime<Utc>,
        _max_error_length: usize,
    ) -> Result<Option<ClaimedJob>, DomainError> {
        Err(connection_refused())
    }

    async fn requeue_stale_jobs(
        &self,
        _cutoff: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<Vec<WorldGenerationJob>, DomainError> {
        Err(connection_refused())
    }
}
