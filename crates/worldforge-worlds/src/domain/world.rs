//! The world aggregate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use worldforge_core::error::DomainError;

/// Lifecycle status of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorldStatus {
    /// Being authored; changes are not yet published.
    Draft,
    /// A publish round is in flight.
    Generating,
    /// Published and up to date.
    Active,
}

impl WorldStatus {
    /// Returns the stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Generating => "GENERATING",
            Self::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for WorldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorldStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "GENERATING" => Ok(Self::Generating),
            "ACTIVE" => Ok(Self::Active),
            other => Err(DomainError::Validation(format!(
                "unknown world status: {other}"
            ))),
        }
    }
}

/// The top-level creative container an author is building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    /// World identifier.
    pub id: Uuid,
    /// The author who owns the world.
    pub owner_id: Uuid,
    /// Display name.
    pub name: String,
    /// One-line pitch.
    pub tagline: Option<String>,
    /// Ordered list of themes.
    pub themes: Vec<String>,
    /// What the author wants the world to convey.
    pub creative_intent: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Current lifecycle status.
    pub status: WorldStatus,
    /// Number of completed publications.
    pub version: i64,
    /// When the last publication completed.
    pub published_at: Option<DateTime<Utc>>,
    /// Who last changed the world's content.
    pub last_edited_by: Option<Uuid>,
    /// When the world's content last changed.
    pub last_edited_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
    /// Store revision, advanced by every write. Writes carrying an older
    /// revision are rejected.
    pub revision: i64,
}

impl World {
    /// Creates a new, never published draft world.
    #[must_use]
    pub fn new(id: Uuid, owner_id: Uuid, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id,
            name,
            tagline: None,
            themes: Vec::new(),
            creative_intent: None,
            notes: None,
            status: WorldStatus::Draft,
            version: 0,
            published_at: None,
            last_edited_by: None,
            last_edited_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Returns true once the world has been published at least once.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.version > 0
    }

    /// Rejects `action` while a publish round is in flight.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Conflict` if the world is `GENERATING`.
    pub fn ensure_not_generating(&self, action: &str) -> Result<(), DomainError> {
        if self.status == WorldStatus::Generating {
            return Err(DomainError::Conflict(format!(
                "cannot {action} while world {} is generating",
                self.id
            )));
        }
        Ok(())
    }

    /// Records a content change. A published world falls back to draft.
    pub fn mark_edited(&mut self, actor_id: Uuid, now: DateTime<Utc>) {
        self.last_edited_by = Some(actor_id);
        self.last_edited_at = Some(now);
        self.updated_at = now;
        if self.status == WorldStatus::Active {
            self.status = WorldStatus::Draft;
        }
    }

    /// Enters a publish round.
    pub fn begin_generation(&mut self, now: DateTime<Utc>) {
        self.status = WorldStatus::Generating;
        self.updated_at = now;
    }

    /// Completes a publish round.
    pub fn finalize_publication(&mut self, now: DateTime<Utc>) {
        self.status = WorldStatus::Active;
        self.version += 1;
        self.published_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft_world() -> World {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        World::new(Uuid::new_v4(), Uuid::new_v4(), "Aldmere".to_owned(), now)
    }

    #[test]
    fn test_new_world_is_unpublished_draft() {
        let world = draft_world();

        assert_eq!(world.status, WorldStatus::Draft);
        assert_eq!(world.version, 0);
        assert!(!world.is_published());
        assert!(world.published_at.is_none());
    }

    #[test]
    fn test_finalize_publication_bumps_version_and_activates() {
        let mut world = draft_world();
        let later = Utc.with_ymd_and_hms(2026, 1, 15, 11, 0, 0).unwrap();
        world.begin_generation(later);

        world.finalize_publication(later);

        assert_eq!(world.status, WorldStatus::Active);
        assert_eq!(world.version, 1);
        assert_eq!(world.published_at, Some(later));
    }

    #[test]
    fn test_mark_edited_demotes_active_world_to_draft() {
        let mut world = draft_world();
        let now = Utc.with_ymd_and_hms(2026, 1, 16, 9, 0, 0).unwrap();
        world.finalize_publication(now);
        let editor = Uuid::new_v4();

        world.mark_edited(editor, now);

        assert_eq!(world.status, WorldStatus::Draft);
        assert_eq!(world.last_edited_by, Some(editor));
        assert_eq!(world.last_edited_at, Some(now));
        assert_eq!(world.version, 1);
    }

    #[test]
    fn test_ensure_not_generating_rejects_generating_world() {
        let mut world = draft_world();
        world.begin_generation(world.created_at);

        match world.ensure_not_generating("publish") {
            Err(DomainError::Conflict(msg)) => assert!(msg.starts_with("cannot publish")),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_world_status_round_trips_through_string_form() {
        for status in [WorldStatus::Draft, WorldStatus::Generating, WorldStatus::Active] {
            assert_eq!(status.as_str().parse::<WorldStatus>().unwrap(), status);
        }
        assert!("PUBLISHED".parse::<WorldStatus>().is_err());
    }
}
