//! Domain error types.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

/// Required fields left blank, keyed by module key.
pub type MissingFields = BTreeMap<String, Vec<String>>;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The identifier that was looked up.
        id: Uuid,
    },

    /// A caller supplied malformed input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Publication was requested while required fields are still blank.
    #[error("missing required fields in {} module(s)", .0.len())]
    MissingRequiredFields(MissingFields),

    /// The operation is not allowed in the entity's current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on {entity} {id}: expected revision {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// Kind of entity that had the conflict.
        entity: &'static str,
        /// The entity that had the conflict.
        id: Uuid,
        /// The revision the writer expected.
        expected: i64,
        /// The revision found in the store.
        actual: i64,
    },

    /// A server-side invariant was violated.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Shorthand for a missing world.
    #[must_use]
    pub fn world_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "world", id }
    }
}
