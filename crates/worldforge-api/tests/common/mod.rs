//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;
use worldforge_core::clock::Clock;
use worldforge_store::pg_world_store::PgWorldStore;
use worldforge_test_support::{
    FixedClock, ScriptedTextGenerator, StaticCredentials, StubPromptRenderer, fixed_now,
};
use worldforge_worlds::application::scheduler::{
    GenerationPorts, GenerationScheduler, SchedulerConfig,
};
use worldforge_worlds::domain::repository::WorldStores;

use worldforge_api::state::AppState;

/// A router over a real `PgWorldStore` plus the scheduler that shares its
/// stores, so tests can drive generation between requests.
pub struct TestApp {
    pub state: AppState,
    pub generator: Arc<ScriptedTextGenerator>,
    pub user_id: Uuid,
}

impl TestApp {
    pub fn new(pool: PgPool) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
        let stores = WorldStores::from_shared(Arc::new(PgWorldStore::new(pool)));
        let generator = Arc::new(ScriptedTextGenerator::echo());
        let ports = GenerationPorts {
            credentials: Arc::new(StaticCredentials::configured()),
            renderer: Arc::new(StubPromptRenderer::new()),
            generator: generator.clone(),
        };
        let scheduler = Arc::new(GenerationScheduler::new(
            stores.clone(),
            ports,
            clock.clone(),
            SchedulerConfig::default(),
        ));

        Self {
            state: AppState::new(stores, clock, scheduler),
            generator,
            user_id: Uuid::new_v4(),
        }
    }

    /// Same route structure as `main.rs`.
    pub fn router(&self) -> Router {
        worldforge_api::build_router(self.state.clone())
    }

    /// Runs scheduler ticks until the queue is empty.
    pub async fn drain_queue(&self) -> usize {
        let mut executed = 0;
        loop {
            let tick = self.state.scheduler.tick().await.unwrap();
            if tick == worldforge_worlds::application::scheduler::QueueTick::Idle {
                return executed;
            }
            executed += 1;
        }
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: &serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.send("POST", uri, Some(body)).await
    }

    pub async fn patch_json(
        &self,
        uri: &str,
        body: &serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.send("PATCH", uri, Some(body)).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send("GET", uri, None).await
    }

    /// Creates a world and fills every required field through the API.
    pub async fn create_complete_world(&self) -> Uuid {
        let (status, json) = self
            .post_json(
                "/api/v1/worlds",
                &serde_json::json!({ "name": "Aldmere", "themes": ["decay", "renewal"] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let world_id = Uuid::parse_str(json["world_id"].as_str().unwrap()).unwrap();

        for module in json["modules"].as_array().unwrap() {
            let key = module["module_key"].as_str().unwrap();
            let definition = key
                .parse::<worldforge_worlds::domain::registry::ModuleKey>()
                .unwrap()
                .definition();
            let fields: serde_json::Map<String, serde_json::Value> = definition
                .fields
                .iter()
                .filter(|field| field.required)
                .map(|field| (field.key.to_owned(), "Described at considerable length".into()))
                .collect();
            let (status, _) = self
                .patch_json(
                    &format!("/api/v1/worlds/{world_id}/modules/{key}"),
                    &serde_json::json!({ "fields": fields }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }
        world_id
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<&serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", self.user_id.to_string());
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        (status, json)
    }
}
