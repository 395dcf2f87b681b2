//! PostgreSQL persistence for the world generation context.

pub mod error;
pub mod pg_world_store;
mod rows;

/// Embedded migrations from the workspace `migrations/` directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
