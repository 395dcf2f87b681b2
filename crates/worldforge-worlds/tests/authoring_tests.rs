//! World creation and module editing.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Harness;
use uuid::Uuid;
use worldforge_core::error::DomainError;
use worldforge_test_support::{FailingWorldStore, FixedClock, InMemoryWorldStore, fixed_now};
use worldforge_worlds::application::command_handlers::{
    handle_create_world, handle_update_module_fields,
};
use worldforge_worlds::domain::commands::{CreateWorld, UpdateModuleFields};
use worldforge_worlds::domain::module::{FieldUpdates, ModuleStatus, WorldModule};
use worldforge_worlds::domain::registry::ModuleKey;
use worldforge_worlds::domain::repository::{GenerationRound, WorldRepository};
use worldforge_worlds::domain::world::{World, WorldStatus};

#[tokio::test]
async fn test_create_world_seeds_one_empty_module_per_key() {
    // Arrange
    let harness = Harness::new();

    // Act
    let world = harness.create_world().await;

    // Assert
    assert_eq!(world.status, WorldStatus::Draft);
    assert_eq!(world.version, 0);
    assert_eq!(world.themes, vec!["decay".to_owned(), "renewal".to_owned()]);
    for key in ModuleKey::ALL {
        let module = harness.store.module(world.id, key);
        assert_eq!(module.status, ModuleStatus::Empty);
        assert!(module.fields.is_empty());
        assert!(module.content_hash.is_none());
    }
}

#[tokio::test]
async fn test_create_world_rejects_blank_name() {
    // Arrange
    let harness = Harness::new();
    let command = CreateWorld {
        correlation_id: Uuid::new_v4(),
        owner_id: harness.owner_id,
        name: "   ".to_owned(),
        tagline: None,
        themes: vec![],
        creative_intent: None,
        notes: None,
    };

    // Act
    let result = handle_create_world(&command, harness.clock.as_ref(), harness.stores.worlds.as_ref()).await;

    // Assert
    assert!(matches!(result, Err(DomainError::Validation(_))));
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_create_world_propagates_store_failure() {
    // Arrange
    let command = CreateWorld {
        correlation_id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        name: "Aldmere".to_owned(),
        tagline: None,
        themes: vec![],
        creative_intent: None,
        notes: None,
    };

    // Act
    let result = handle_create_world(&command, &FixedClock(fixed_now()), &FailingWorldStore).await;

    // Assert
    assert!(matches!(result, Err(DomainError::Infrastructure(_))));
}

#[tokio::test]
async fn test_edit_moves_module_through_in_progress_to_ready() {
    // Arrange
    let harness = Harness::new();
    let world = harness.create_world().await;

    // Act
    let partial = harness
        .edit(world.id, ModuleKey::Cosmology, &[("origin", Some("Sung into being by twin choirs"))])
        .await
        .unwrap();
    let complete = harness
        .edit(world.id, ModuleKey::Cosmology, &[("metaphysics", Some("Magic is borrowed breath"))])
        .await
        .unwrap();

    // Assert
    assert_eq!(partial.module.status, ModuleStatus::InProgress);
    assert_eq!(complete.module.status, ModuleStatus::Ready);
    assert!(complete.content_changed);
    assert_ne!(partial.module.content_hash, complete.module.content_hash);
    assert_eq!(complete.module.last_edited_by, Some(harness.owner_id));
    assert_eq!(harness.store.world(world.id).last_edited_by, Some(harness.owner_id));
}

#[tokio::test]
async fn test_removing_only_field_returns_module_to_empty() {
    // Arrange
    let harness = Harness::new();
    let world = harness.create_world().await;
    harness
        .edit(world.id, ModuleKey::Peoples, &[("origins", Some("Descended from the tide"))])
        .await
        .unwrap();

    // Act
    let outcome = harness
        .edit(world.id, ModuleKey::Peoples, &[("origins", Some(""))])
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.module.status, ModuleStatus::Empty);
    assert!(outcome.module.content_hash.is_none());
}

#[tokio::test]
async fn test_unchanged_edit_writes_nothing() {
    // Arrange
    let harness = Harness::new();
    let world = harness.create_world().await;
    let pairs = [("continents", Some("Three drifting continents"))];
    harness.edit(world.id, ModuleKey::Geography, &pairs).await.unwrap();
    let writes_before = harness.store.write_count();

    // Act
    let repeated = harness.edit(world.id, ModuleKey::Geography, &pairs).await.unwrap();
    let empty = harness.edit(world.id, ModuleKey::Geography, &[]).await.unwrap();

    // Assert
    assert!(!repeated.applied);
    assert!(!empty.applied);
    assert_eq!(harness.store.write_count(), writes_before);
}

#[tokio::test]
async fn test_invalid_edit_is_rejected_without_writes() {
    // Arrange
    let harness = Harness::new();
    let world = harness.create_world().await;
    let writes_before = harness.store.write_count();

    // Act
    let too_short = harness
        .edit(world.id, ModuleKey::History, &[("founding", Some("Once"))])
        .await;
    let unknown = harness
        .edit(world.id, ModuleKey::History, &[("weather", Some("Rainy all year long"))])
        .await;

    // Assert
    assert!(matches!(too_short, Err(DomainError::Validation(_))));
    assert!(matches!(unknown, Err(DomainError::Validation(_))));
    assert_eq!(harness.store.write_count(), writes_before);
}

#[tokio::test]
async fn test_edit_of_unknown_world_is_not_found() {
    // Arrange
    let harness = Harness::new();

    // Act
    let result = harness
        .edit(Uuid::new_v4(), ModuleKey::History, &[("founding", Some("The city rose from a crater"))])
        .await;

    // Assert
    assert!(matches!(result, Err(DomainError::NotFound { entity: "world", .. })));
}

#[tokio::test]
async fn test_edit_of_published_module_awaits_generation_and_demotes_world() {
    // Arrange
    let harness = Harness::new();
    let world = harness.published_world().await;
    assert_eq!(world.status, WorldStatus::Active);

    // Act
    let outcome = harness
        .edit(world.id, ModuleKey::Societies, &[("laws", Some("Debts are inherited by the eldest"))])
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.module.status, ModuleStatus::AwaitingGeneration);
    assert_eq!(outcome.world.status, WorldStatus::Draft);
    assert_eq!(harness.store.world(world.id).version, 1);
    assert!(outcome.module.full_content.is_some());
}

#[tokio::test]
async fn test_edit_while_generating_is_a_conflict() {
    // Arrange
    let harness = Harness::new();
    let world = harness.create_world().await;
    harness.fill_all_required(world.id).await;
    harness.publish(world.id).await.unwrap();

    // Act
    let result = harness
        .edit(world.id, ModuleKey::Cosmology, &[("deities", Some("A pantheon of seven"))])
        .await;

    // Assert
    assert!(matches!(result, Err(DomainError::Conflict(_))));
    assert_eq!(
        harness.store.module(world.id, ModuleKey::Cosmology).status,
        ModuleStatus::AwaitingGeneration
    );
}

#[tokio::test]
async fn test_stale_revision_edit_is_a_concurrency_conflict() {
    // Arrange
    let harness = Harness::new();
    let world = harness.create_world().await;
    let mut stale = harness.store.module(world.id, ModuleKey::Cultures);
    harness
        .edit(world.id, ModuleKey::Cultures, &[("beliefs", Some("The dead walk at midwinter"))])
        .await
        .unwrap();
    stale.status = ModuleStatus::Ready;

    // Act
    let result = harness.stores.modules.update_module(&mut stale).await;

    // Assert
    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict { expected: 0, actual: 1, .. })
    ));
}

/// Serves a fixed world snapshot on reads and forwards writes to the store,
/// as if the snapshot was read just before another request committed.
struct SnapshotReads {
    store: Arc<InMemoryWorldStore>,
    snapshot: World,
}

#[async_trait]
impl WorldRepository for SnapshotReads {
    async fn create_world(&self, world: &World, modules: &[WorldModule]) -> Result<(), DomainError> {
        self.store.create_world(world, modules).await
    }

    async fn find_world(&self, _world_id: Uuid) -> Result<Option<World>, DomainError> {
        Ok(Some(self.snapshot.clone()))
    }

    async fn update_world(&self, world: &mut World) -> Result<(), DomainError> {
        self.store.update_world(world).await
    }

    async fn commit_module_edit(
        &self,
        world: &mut World,
        module: &mut WorldModule,
    ) -> Result<(), DomainError> {
        self.store.commit_module_edit(world, module).await
    }

    async fn commit_generation_round(
        &self,
        round: &mut GenerationRound,
    ) -> Result<(), DomainError> {
        self.store.commit_generation_round(round).await
    }

    async fn finalize_if_drained(
        &self,
        world_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<World>, DomainError> {
        self.store.finalize_if_drained(world_id, now).await
    }
}

#[tokio::test]
async fn test_edit_racing_a_publish_cannot_overwrite_generating_world() {
    // Arrange
    let harness = Harness::new();
    let world = harness.published_world().await;
    harness
        .fill_required(world.id, ModuleKey::Geography, "Rewritten after the great flood")
        .await;
    let snapshot = harness.store.world(world.id);
    harness.publish(world.id).await.unwrap();
    let cosmology_before = harness.store.module(world.id, ModuleKey::Cosmology);
    let stale_reads = SnapshotReads {
        store: harness.store.clone(),
        snapshot,
    };
    let mut updates = FieldUpdates::new();
    updates.insert("deities".to_owned(), Some("A pantheon of seven".to_owned()));
    let command = UpdateModuleFields {
        correlation_id: Uuid::new_v4(),
        editor_id: harness.owner_id,
        world_id: world.id,
        module_key: ModuleKey::Cosmology,
        updates,
    };

    // Act
    let result = handle_update_module_fields(
        &command,
        harness.clock.as_ref(),
        &stale_reads,
        harness.stores.modules.as_ref(),
    )
    .await;

    // Assert
    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict { entity: "world", .. })
    ));
    assert_eq!(harness.store.world(world.id).status, WorldStatus::Generating);
    assert_eq!(harness.store.module(world.id, ModuleKey::Cosmology), cosmology_before);

    // Act
    harness.drain().await;

    // Assert
    let world = harness.store.world(world.id);
    assert_eq!(world.status, WorldStatus::Active);
    assert_eq!(world.version, 2);
}

#[tokio::test]
async fn test_module_edit_advances_world_revision() {
    // Arrange
    let harness = Harness::new();
    let world = harness.create_world().await;

    // Act
    let outcome = harness
        .edit(world.id, ModuleKey::History, &[("founding", Some("Founded on the bones of giants"))])
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.world.revision, world.revision + 1);
    assert_eq!(harness.store.world(world.id).revision, outcome.world.revision);
    assert_eq!(outcome.module.revision, 1);
}
