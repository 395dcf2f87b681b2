//! Error types for the store.

use uuid::Uuid;
use worldforge_core::error::DomainError;

/// Errors raised while reading or writing store rows.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row holds a value the domain cannot represent.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow {
        /// Table the row was read from.
        table: &'static str,
        /// What could not be decoded.
        message: String,
    },

    /// The row to update does not exist.
    #[error("{entity} not found: {id}")]
    Missing {
        /// Kind of entity.
        entity: &'static str,
        /// Its identifier.
        id: Uuid,
    },

    /// A row was written by someone else since it was read.
    #[error("stale revision for {entity} {id}: expected {expected}, found {actual}")]
    StaleRevision {
        /// Kind of entity.
        entity: &'static str,
        /// Its identifier.
        id: Uuid,
        /// Revision the writer read.
        expected: i64,
        /// Revision currently stored.
        actual: i64,
    },
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing { entity, id } => Self::NotFound { entity, id },
            StoreError::StaleRevision {
                entity,
                id,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                entity,
                id,
                expected,
                actual,
            },
            other => Self::Infrastructure(other.to_string()),
        }
    }
}
