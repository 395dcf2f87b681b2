//! `PostgreSQL` implementation of the world, module and job repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;
use worldforge_core::error::DomainError;
use worldforge_worlds::domain::job::{JobStatus, STALE_JOB_ERROR, WorldGenerationJob};
use worldforge_worlds::domain::module::WorldModule;
use worldforge_worlds::domain::registry::ModuleKey;
use worldforge_worlds::domain::repository::{
    ClaimedJob, GenerationRound, JobRepository, ModuleRepository, WorldRepository,
};
use worldforge_worlds::domain::world::{World, WorldStatus};

use crate::error::StoreError;
use crate::rows::{JOB_COLUMNS, JobRow, MODULE_COLUMNS, ModuleRow, WORLD_COLUMNS, WorldRow, convert_all};

/// PostgreSQL-backed store for worlds, modules and generation jobs.
#[derive(Debug, Clone)]
pub struct PgWorldStore {
    pool: PgPool,
}

impl PgWorldStore {
    /// Creates a new `PgWorldStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Migration`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        crate::MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

async fn insert_world(conn: &mut PgConnection, world: &World) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO worlds ({WORLD_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
    ))
    .bind(world.id)
    .bind(world.owner_id)
    .bind(&world.name)
    .bind(&world.tagline)
    .bind(&world.themes)
    .bind(&world.creative_intent)
    .bind(&world.notes)
    .bind(world.status.as_str())
    .bind(world.version)
    .bind(world.published_at)
    .bind(world.last_edited_by)
    .bind(world.last_edited_at)
    .bind(world.created_at)
    .bind(world.updated_at)
    .bind(world.revision)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Explains why a revision-checked update touched no row.
async fn stale_or_missing(
    conn: &mut PgConnection,
    entity: &'static str,
    id: Uuid,
    expected: i64,
    current: &str,
) -> StoreError {
    let found: Result<Option<(i64,)>, sqlx::Error> =
        sqlx::query_as(current).bind(id).fetch_optional(&mut *conn).await;
    match found {
        Ok(Some((actual,))) => StoreError::StaleRevision {
            entity,
            id,
            expected,
            actual,
        },
        Ok(None) => StoreError::Missing { entity, id },
        Err(e) => StoreError::Postgres(e),
    }
}

/// Writes `world` if the stored revision still equals `world.revision`
/// and returns the new revision.
async fn write_world(conn: &mut PgConnection, world: &World) -> Result<i64, StoreError> {
    let updated: Option<(i64,)> = sqlx::query_as(
        "UPDATE worlds SET name = $2, tagline = $3, themes = $4, creative_intent = $5, \
         notes = $6, status = $7, version = $8, published_at = $9, last_edited_by = $10, \
         last_edited_at = $11, updated_at = $12, revision = revision + 1 \
         WHERE id = $1 AND revision = $13 \
         RETURNING revision",
    )
    .bind(world.id)
    .bind(&world.name)
    .bind(&world.tagline)
    .bind(&world.themes)
    .bind(&world.creative_intent)
    .bind(&world.notes)
    .bind(world.status.as_str())
    .bind(world.version)
    .bind(world.published_at)
    .bind(world.last_edited_by)
    .bind(world.last_edited_at)
    .bind(world.updated_at)
    .bind(world.revision)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some((revision,)) => Ok(revision),
        None => Err(stale_or_missing(
            conn,
            "world",
            world.id,
            world.revision,
            "SELECT revision FROM worlds WHERE id = $1",
        )
        .await),
    }
}

async fn insert_module(conn: &mut PgConnection, module: &WorldModule) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO world_modules ({MODULE_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
    ))
    .bind(module.id)
    .bind(module.world_id)
    .bind(module.module_key.as_str())
    .bind(Json(&module.fields))
    .bind(&module.content_hash)
    .bind(&module.full_content)
    .bind(module.full_content_updated_at)
    .bind(module.status.as_str())
    .bind(module.revision)
    .bind(module.last_edited_by)
    .bind(module.last_edited_at)
    .bind(module.created_at)
    .bind(module.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Writes `module` if the stored revision still equals `module.revision`
/// and returns the new revision.
async fn write_module(conn: &mut PgConnection, module: &WorldModule) -> Result<i64, StoreError> {
    let updated: Option<(i64,)> = sqlx::query_as(
        "UPDATE world_modules SET fields = $3, content_hash = $4, full_content = $5, \
         full_content_updated_at = $6, status = $7, last_edited_by = $8, last_edited_at = $9, \
         updated_at = $10, revision = revision + 1 \
         WHERE world_id = $1 AND module_key = $2 AND revision = $11 \
         RETURNING revision",
    )
    .bind(module.world_id)
    .bind(module.module_key.as_str())
    .bind(Json(&module.fields))
    .bind(&module.content_hash)
    .bind(&module.full_content)
    .bind(module.full_content_updated_at)
    .bind(module.status.as_str())
    .bind(module.last_edited_by)
    .bind(module.last_edited_at)
    .bind(module.updated_at)
    .bind(module.revision)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some((revision,)) => Ok(revision),
        None => Err(stale_or_missing(
            conn,
            "world_module",
            module.id,
            module.revision,
            "SELECT revision FROM world_modules WHERE id = $1",
        )
        .await),
    }
}

async fn insert_job(conn: &mut PgConnection, job: &WorldGenerationJob) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO world_generation_jobs ({JOB_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(job.id)
    .bind(job.world_id)
    .bind(job.module_key.as_str())
    .bind(job.job_type.as_str())
    .bind(job.status.as_str())
    .bind(job.sequence)
    .bind(job.attempts)
    .bind(job.started_at)
    .bind(job.finished_at)
    .bind(&job.last_error)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_job(conn: &mut PgConnection, job: &WorldGenerationJob) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE world_generation_jobs SET status = $2, attempts = $3, started_at = $4, \
         finished_at = $5, last_error = $6, updated_at = $7 \
         WHERE id = $1",
    )
    .bind(job.id)
    .bind(job.status.as_str())
    .bind(job.attempts)
    .bind(job.started_at)
    .bind(job.finished_at)
    .bind(&job.last_error)
    .bind(job.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Missing {
            entity: "world_generation_job",
            id: job.id,
        });
    }
    Ok(())
}

async fn replace_world_jobs(
    conn: &mut PgConnection,
    world_id: Uuid,
    jobs: &[WorldGenerationJob],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM world_generation_jobs WHERE world_id = $1")
        .bind(world_id)
        .execute(&mut *conn)
        .await?;
    for job in jobs {
        insert_job(conn, job).await?;
    }
    Ok(())
}

async fn select_world(conn: &mut PgConnection, world_id: Uuid) -> Result<Option<World>, StoreError> {
    let row: Option<WorldRow> =
        sqlx::query_as(&format!("SELECT {WORLD_COLUMNS} FROM worlds WHERE id = $1"))
            .bind(world_id)
            .fetch_optional(&mut *conn)
            .await?;
    row.map(World::try_from).transpose()
}

impl PgWorldStore {
    async fn claim(
        &self,
        now: DateTime<Utc>,
        max_error_length: usize,
    ) -> Result<Option<ClaimedJob>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM world_generation_jobs \
             WHERE status = 'WAITING' \
             ORDER BY sequence, id \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        ))
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let mut job = WorldGenerationJob::try_from(row)?;
        job.start(now);
        let claimed = match select_world(&mut tx, job.world_id).await? {
            Some(world) => {
                write_job(&mut tx, &job).await?;
                ClaimedJob::Ready { job, world }
            }
            None => {
                let message = job.orphan_error();
                job.fail(&message, max_error_length, now);
                write_job(&mut tx, &job).await?;
                ClaimedJob::Orphaned(job)
            }
        };
        tx.commit().await?;
        Ok(Some(claimed))
    }

    // Transactions lock the world row before any module row.

    async fn commit_round(&self, round: &mut GenerationRound) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let world_revision = write_world(&mut tx, &round.world).await?;
        let mut module_revisions = Vec::with_capacity(round.modules.len());
        for module in &round.modules {
            module_revisions.push(write_module(&mut tx, module).await?);
        }
        replace_world_jobs(&mut tx, round.world.id, &round.jobs).await?;
        tx.commit().await?;

        round.world.revision = world_revision;
        for (module, revision) in round.modules.iter_mut().zip(module_revisions) {
            module.revision = revision;
        }
        debug!(world_id = %round.world.id, jobs = round.jobs.len(), "generation round committed");
        Ok(())
    }

    async fn commit_edit(
        &self,
        world: &mut World,
        module: &mut WorldModule,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let world_revision = write_world(&mut tx, world).await?;
        let module_revision = write_module(&mut tx, module).await?;
        tx.commit().await?;
        world.revision = world_revision;
        module.revision = module_revision;
        Ok(())
    }

    async fn finalize(&self, world_id: Uuid, now: DateTime<Utc>) -> Result<Option<World>, StoreError> {
        let row: Option<WorldRow> = sqlx::query_as(&format!(
            "UPDATE worlds SET status = $2, version = version + 1, published_at = $3, \
             updated_at = $3, revision = revision + 1 \
             WHERE id = $1 AND status = $4 \
             AND NOT EXISTS ( \
                 SELECT 1 FROM world_generation_jobs \
                 WHERE world_id = $1 AND status IN ($5, $6) \
             ) \
             RETURNING {WORLD_COLUMNS}"
        ))
        .bind(world_id)
        .bind(WorldStatus::Active.as_str())
        .bind(now)
        .bind(WorldStatus::Generating.as_str())
        .bind(JobStatus::Waiting.as_str())
        .bind(JobStatus::Running.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(World::try_from).transpose()
    }

    async fn requeue_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorldGenerationJob>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "UPDATE world_generation_jobs SET status = $3, started_at = NULL, \
             last_error = $4, updated_at = $2 \
             WHERE status = $5 AND started_at < $1 \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(cutoff)
        .bind(now)
        .bind(JobStatus::Waiting.as_str())
        .bind(STALE_JOB_ERROR)
        .bind(JobStatus::Running.as_str())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}

#[async_trait]
impl WorldRepository for PgWorldStore {
    async fn create_world(
        &self,
        world: &World,
        modules: &[WorldModule],
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        insert_world(&mut tx, world).await?;
        for module in modules {
            insert_module(&mut tx, module).await?;
        }
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn find_world(&self, world_id: Uuid) -> Result<Option<World>, DomainError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(select_world(&mut conn, world_id).await?)
    }

    async fn update_world(&self, world: &mut World) -> Result<(), DomainError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        world.revision = write_world(&mut conn, world).await?;
        Ok(())
    }

    async fn commit_module_edit(
        &self,
        world: &mut World,
        module: &mut WorldModule,
    ) -> Result<(), DomainError> {
        Ok(self.commit_edit(world, module).await?)
    }

    async fn commit_generation_round(
        &self,
        round: &mut GenerationRound,
    ) -> Result<(), DomainError> {
        Ok(self.commit_round(round).await?)
    }

    async fn finalize_if_drained(
        &self,
        world_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<World>, DomainError> {
        Ok(self.finalize(world_id, now).await?)
    }
}

#[async_trait]
impl ModuleRepository for PgWorldStore {
    async fn list_modules(&self, world_id: Uuid) -> Result<Vec<WorldModule>, DomainError> {
        let rows: Vec<ModuleRow> = sqlx::query_as(&format!(
            "SELECT {MODULE_COLUMNS} FROM world_modules WHERE world_id = $1"
        ))
        .bind(world_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        let mut modules: Vec<WorldModule> = convert_all(rows)?;
        modules.sort_by_key(|module| module.module_key);
        Ok(modules)
    }

    async fn find_module(
        &self,
        world_id: Uuid,
        module_key: ModuleKey,
    ) -> Result<Option<WorldModule>, DomainError> {
        let row: Option<ModuleRow> = sqlx::query_as(&format!(
            "SELECT {MODULE_COLUMNS} FROM world_modules WHERE world_id = $1 AND module_key = $2"
        ))
        .bind(world_id)
        .bind(module_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(WorldModule::try_from).transpose()?)
    }

    async fn update_module(&self, module: &mut WorldModule) -> Result<(), DomainError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        module.revision = write_module(&mut conn, module).await?;
        Ok(())
    }
}

#[async_trait]
impl JobRepository for PgWorldStore {
    async fn replace_jobs(
        &self,
        world_id: Uuid,
        jobs: &[WorldGenerationJob],
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        replace_world_jobs(&mut tx, world_id, jobs).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn list_jobs(&self, world_id: Uuid) -> Result<Vec<WorldGenerationJob>, DomainError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM world_generation_jobs \
             WHERE world_id = $1 ORDER BY sequence, id"
        ))
        .bind(world_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn find_job(
        &self,
        world_id: Uuid,
        module_key: ModuleKey,
    ) -> Result<Option<WorldGenerationJob>, DomainError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM world_generation_jobs \
             WHERE world_id = $1 AND module_key = $2"
        ))
        .bind(world_id)
        .bind(module_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(WorldGenerationJob::try_from).transpose()?)
    }

    async fn update_job(&self, job: &WorldGenerationJob) -> Result<(), DomainError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(write_job(&mut conn, job).await?)
    }

    async fn claim_next_job(
        &self,
        now: DateTime<Utc>,
        max_error_length: usize,
    ) -> Result<Option<ClaimedJob>, DomainError> {
        Ok(self.claim(now, max_error_length).await?)
    }

    async fn requeue_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorldGenerationJob>, DomainError> {
        Ok(self.requeue_stale(cutoff, now).await?)
    }
}
