//! Row types and their conversions to domain entities.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;
use worldforge_worlds::domain::job::WorldGenerationJob;
use worldforge_worlds::domain::module::WorldModule;
use worldforge_worlds::domain::registry::FieldMap;
use worldforge_worlds::domain::world::World;

use crate::error::StoreError;

pub(crate) const WORLD_COLUMNS: &str = "id, owner_id, name, tagline, themes, creative_intent, \
     notes, status, version, published_at, last_edited_by, last_edited_at, created_at, updated_at, \
     revision";

pub(crate) const MODULE_COLUMNS: &str = "id, world_id, module_key, fields, content_hash, \
     full_content, full_content_updated_at, status, revision, last_edited_by, last_edited_at, \
     created_at, updated_at";

pub(crate) const JOB_COLUMNS: &str = "id, world_id, module_key, job_type, status, sequence, \
     attempts, started_at, finished_at, last_error, created_at, updated_at";

fn parse<T: FromStr>(table: &'static str, value: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| StoreError::CorruptRow {
        table,
        message: e.to_string(),
    })
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct WorldRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    tagline: Option<String>,
    themes: Vec<String>,
    creative_intent: Option<String>,
    notes: Option<String>,
    status: String,
    version: i64,
    published_at: Option<DateTime<Utc>>,
    last_edited_by: Option<Uuid>,
    last_edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revision: i64,
}

impl TryFrom<WorldRow> for World {
    type Error = StoreError;

    fn try_from(row: WorldRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            tagline: row.tagline,
            themes: row.themes,
            creative_intent: row.creative_intent,
            notes: row.notes,
            status: parse("worlds", &row.status)?,
            version: row.version,
            published_at: row.published_at,
            last_edited_by: row.last_edited_by,
            last_edited_at: row.last_edited_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            revision: row.revision,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ModuleRow {
    id: Uuid,
    world_id: Uuid,
    module_key: String,
    fields: Json<FieldMap>,
    content_hash: Option<String>,
    full_content: Option<String>,
    full_content_updated_at: Option<DateTime<Utc>>,
    status: String,
    revision: i64,
    last_edited_by: Option<Uuid>,
    last_edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ModuleRow> for WorldModule {
    type Error = StoreError;

    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            world_id: row.world_id,
            module_key: parse("world_modules", &row.module_key)?,
            fields: row.fields.0,
            content_hash: row.content_hash,
            full_content: row.full_content,
            full_content_updated_at: row.full_content_updated_at,
            status: parse("world_modules", &row.status)?,
            revision: row.revision,
            last_edited_by: row.last_edited_by,
            last_edited_at: row.last_edited_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    id: Uuid,
    world_id: Uuid,
    module_key: String,
    job_type: String,
    status: String,
    sequence: i32,
    attempts: i32,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for WorldGenerationJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            world_id: row.world_id,
            module_key: parse("world_generation_jobs", &row.module_key)?,
            job_type: parse("world_generation_jobs", &row.job_type)?,
            status: parse("world_generation_jobs", &row.status)?,
            sequence: row.sequence,
            attempts: row.attempts,
            started_at: row.started_at,
            finished_at: row.finished_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Converts a batch of rows, failing on the first corrupt one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
