//! Shared harness for world generation scenario tests.

#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;
use worldforge_core::error::DomainError;
use worldforge_test_support::{
    InMemoryWorldStore, ManualClock, ScriptedTextGenerator, StaticCredentials, StubPromptRenderer,
    fixed_now,
};
use worldforge_worlds::application::command_handlers::{
    ModuleEditOutcome, handle_create_world, handle_update_module_fields,
};
use worldforge_worlds::application::publication::{PublishOutcome, handle_publish_world};
use worldforge_worlds::application::scheduler::{
    GenerationPorts, GenerationScheduler, QueueTick, SchedulerConfig,
};
use worldforge_worlds::domain::commands::{CreateWorld, PublishWorld, UpdateModuleFields};
use worldforge_worlds::domain::generation::TextGenerator;
use worldforge_worlds::domain::module::FieldUpdates;
use worldforge_worlds::domain::registry::ModuleKey;
use worldforge_worlds::domain::repository::WorldStores;
use worldforge_worlds::domain::world::World;

pub struct Harness {
    pub store: Arc<InMemoryWorldStore>,
    pub stores: WorldStores,
    pub clock: Arc<ManualClock>,
    pub renderer: Arc<StubPromptRenderer>,
    pub generator: Arc<ScriptedTextGenerator>,
    pub scheduler: GenerationScheduler,
    pub owner_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(StaticCredentials::configured(), None, SchedulerConfig::default())
    }

    pub fn with_credentials(credentials: StaticCredentials) -> Self {
        Self::build(credentials, None, SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::build(StaticCredentials::configured(), None, config)
    }

    /// Uses `generator` in the scheduler instead of the scripted one.
    pub fn with_generator(generator: Arc<dyn TextGenerator>, store: Arc<InMemoryWorldStore>) -> Self {
        Self::build_on(
            store,
            StaticCredentials::configured(),
            Some(generator),
            SchedulerConfig::default(),
        )
    }

    fn build(
        credentials: StaticCredentials,
        generator: Option<Arc<dyn TextGenerator>>,
        config: SchedulerConfig,
    ) -> Self {
        Self::build_on(Arc::new(InMemoryWorldStore::new()), credentials, generator, config)
    }

    fn build_on(
        store: Arc<InMemoryWorldStore>,
        credentials: StaticCredentials,
        generator: Option<Arc<dyn TextGenerator>>,
        config: SchedulerConfig,
    ) -> Self {
        let stores = WorldStores::from_shared(store.clone());
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let renderer = Arc::new(StubPromptRenderer::new());
        let scripted = Arc::new(ScriptedTextGenerator::echo());
        let generator: Arc<dyn TextGenerator> = match generator {
            Some(generator) => generator,
            None => scripted.clone(),
        };
        let ports = GenerationPorts {
            credentials: Arc::new(credentials),
            renderer: renderer.clone(),
            generator,
        };
        let scheduler = GenerationScheduler::new(stores.clone(), ports, clock.clone(), config);
        Self {
            store,
            stores,
            clock,
            renderer,
            generator: scripted,
            scheduler,
            owner_id: Uuid::new_v4(),
        }
    }

    pub async fn create_world(&self) -> World {
        let command = CreateWorld {
            correlation_id: Uuid::new_v4(),
            owner_id: self.owner_id,
            name: "Aldmere".to_owned(),
            tagline: Some("A drowned empire".to_owned()),
            themes: vec!["decay".to_owned(), "renewal".to_owned()],
            creative_intent: None,
            notes: None,
        };
        handle_create_world(&command, self.clock.as_ref(), self.stores.worlds.as_ref())
            .await
            .unwrap()
    }

    pub async fn edit(
        &self,
        world_id: Uuid,
        module_key: ModuleKey,
        pairs: &[(&str, Option<&str>)],
    ) -> Result<ModuleEditOutcome, DomainError> {
        let updates: FieldUpdates = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.map(ToOwned::to_owned)))
            .collect();
        let command = UpdateModuleFields {
            correlation_id: Uuid::new_v4(),
            editor_id: self.owner_id,
            world_id,
            module_key,
            updates,
        };
        handle_update_module_fields(
            &command,
            self.clock.as_ref(),
            self.stores.worlds.as_ref(),
            self.stores.modules.as_ref(),
        )
        .await
    }

    /// Fills every required field of `module_key` with `text`.
    pub async fn fill_required(&self, world_id: Uuid, module_key: ModuleKey, text: &str) {
        let pairs: Vec<(&str, Option<&str>)> = module_key
            .definition()
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| (field.key, Some(text)))
            .collect();
        self.edit(world_id, module_key, &pairs).await.unwrap();
    }

    pub async fn fill_all_required(&self, world_id: Uuid) {
        for key in ModuleKey::ALL {
            self.fill_required(world_id, key, "Described at considerable length")
                .await;
        }
    }

    pub async fn publish(&self, world_id: Uuid) -> Result<PublishOutcome, DomainError> {
        let command = PublishWorld {
            correlation_id: Uuid::new_v4(),
            requested_by: self.owner_id,
            world_id,
        };
        handle_publish_world(&command, self.clock.as_ref(), &self.stores).await
    }

    /// Ticks the scheduler until the queue is idle and returns every
    /// non-idle outcome.
    pub async fn drain(&self) -> Vec<QueueTick> {
        let mut outcomes = Vec::new();
        loop {
            match self.scheduler.tick().await.unwrap() {
                QueueTick::Idle => return outcomes,
                outcome => outcomes.push(outcome),
            }
        }
    }

    /// A world with every module filled and published once.
    pub async fn published_world(&self) -> World {
        let world = self.create_world().await;
        self.fill_all_required(world.id).await;
        self.publish(world.id).await.unwrap();
        self.drain().await;
        self.store.world(world.id)
    }
}
