//! Routes for world authoring, publication and generation progress.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use worldforge_worlds::application::command_handlers;
use worldforge_worlds::application::publication::{
    PublicationPreview, handle_publish_world, preview_publication,
};
use worldforge_worlds::application::query_handlers::{
    GenerationStatusView, JobView, ModuleView, WorldView, get_generation_status, get_world,
};
use worldforge_worlds::domain::commands;
use worldforge_worlds::domain::module::FieldUpdates;
use worldforge_worlds::domain::registry::ModuleKey;
use worldforge_worlds::domain::world::WorldStatus;

use crate::error::ApiError;
use crate::extract::CallerId;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateWorldRequest {
    /// Display name.
    pub name: String,
    /// One-line pitch.
    pub tagline: Option<String>,
    /// Ordered themes.
    #[serde(default)]
    pub themes: Vec<String>,
    /// What the author wants the world to convey.
    pub creative_intent: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Request body for PATCH /{world_id}/modules/{module_key}.
#[derive(Debug, Deserialize)]
pub struct UpdateModuleRequest {
    /// Field values to set; `null` or blank removes a field.
    pub fields: FieldUpdates,
}

/// Response body for a module field update.
#[derive(Debug, Serialize)]
pub struct ModuleUpdateResponse {
    /// The module after the update.
    pub module: ModuleView,
    /// The owning world's status.
    pub world_status: WorldStatus,
    /// Whether anything was written.
    pub applied: bool,
    /// Whether the content fingerprint changed.
    pub content_changed: bool,
}

/// Response body for a publish request.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// The published world.
    pub world_id: Uuid,
    /// `GENERATING`, or `ACTIVE` when nothing needed generating.
    pub status: WorldStatus,
    /// Number of completed publications.
    pub version: i64,
    /// The seeded jobs.
    pub jobs: Vec<JobView>,
    /// Modules kept as they are.
    pub modules_to_reuse: Vec<ModuleKey>,
}

fn parse_module_key(raw: &str) -> Result<ModuleKey, ApiError> {
    Ok(raw.parse::<ModuleKey>()?)
}

/// POST /
#[instrument(skip_all, fields(owner_id = %owner_id))]
async fn create_world(
    State(state): State<AppState>,
    CallerId(owner_id): CallerId,
    Json(request): Json<CreateWorldRequest>,
) -> Result<(StatusCode, Json<WorldView>), ApiError> {
    let command = commands::CreateWorld {
        correlation_id: Uuid::new_v4(),
        owner_id,
        name: request.name,
        tagline: request.tagline,
        themes: request.themes,
        creative_intent: request.creative_intent,
        notes: request.notes,
    };

    info!(correlation_id = %command.correlation_id, "handling create_world command");

    let world = command_handlers::handle_create_world(
        &command,
        state.clock.as_ref(),
        state.stores.worlds.as_ref(),
    )
    .await?;
    let view = get_world(world.id, &state.stores).await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /{world_id}
async fn show_world(
    State(state): State<AppState>,
    Path(world_id): Path<Uuid>,
) -> Result<Json<WorldView>, ApiError> {
    let view = get_world(world_id, &state.stores).await?;
    Ok(Json(view))
}

/// PATCH /{world_id}/modules/{module_key}
#[instrument(skip_all, fields(world_id = %world_id, module_key = %module_key, editor_id = %editor_id))]
async fn update_module(
    State(state): State<AppState>,
    CallerId(editor_id): CallerId,
    Path((world_id, module_key)): Path<(Uuid, String)>,
    Json(request): Json<UpdateModuleRequest>,
) -> Result<Json<ModuleUpdateResponse>, ApiError> {
    let command = commands::UpdateModuleFields {
        correlation_id: Uuid::new_v4(),
        editor_id,
        world_id,
        module_key: parse_module_key(&module_key)?,
        updates: request.fields,
    };

    info!(correlation_id = %command.correlation_id, "handling update_module_fields command");

    let outcome = command_handlers::handle_update_module_fields(
        &command,
        state.clock.as_ref(),
        state.stores.worlds.as_ref(),
        state.stores.modules.as_ref(),
    )
    .await?;

    Ok(Json(ModuleUpdateResponse {
        module: ModuleView::from(&outcome.module),
        world_status: outcome.world.status,
        applied: outcome.applied,
        content_changed: outcome.content_changed,
    }))
}

/// GET /{world_id}/publish/preview
async fn publish_preview(
    State(state): State<AppState>,
    Path(world_id): Path<Uuid>,
) -> Result<Json<PublicationPreview>, ApiError> {
    let preview = preview_publication(world_id, &state.stores).await?;
    Ok(Json(preview))
}

/// POST /{world_id}/publish
#[instrument(skip_all, fields(world_id = %world_id, requested_by = %requested_by))]
async fn publish_world(
    State(state): State<AppState>,
    CallerId(requested_by): CallerId,
    Path(world_id): Path<Uuid>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let command = commands::PublishWorld {
        correlation_id: Uuid::new_v4(),
        requested_by,
        world_id,
    };

    info!(correlation_id = %command.correlation_id, "handling publish_world command");

    let outcome = handle_publish_world(&command, state.clock.as_ref(), &state.stores).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            world_id: outcome.world.id,
            status: outcome.world.status,
            version: outcome.world.version,
            jobs: outcome.jobs.iter().map(JobView::from).collect(),
            modules_to_reuse: outcome.modules_to_reuse,
        }),
    ))
}

/// POST /{world_id}/modules/{module_key}/retry
#[instrument(skip_all, fields(world_id = %world_id, module_key = %module_key, requested_by = %requested_by))]
async fn retry_module(
    State(state): State<AppState>,
    CallerId(requested_by): CallerId,
    Path((world_id, module_key)): Path<(Uuid, String)>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let command = commands::RetryModule {
        correlation_id: Uuid::new_v4(),
        requested_by,
        world_id,
        module_key: parse_module_key(&module_key)?,
    };

    info!(correlation_id = %command.correlation_id, "handling retry_module command");

    let job = state.scheduler.retry_module(&command).await?;

    Ok((StatusCode::ACCEPTED, Json(JobView::from(&job))))
}

/// GET /{world_id}/generation-status
async fn generation_status(
    State(state): State<AppState>,
    Path(world_id): Path<Uuid>,
) -> Result<Json<GenerationStatusView>, ApiError> {
    let view = get_generation_status(world_id, &state.stores).await?;
    Ok(Json(view))
}

/// Returns the router for the worlds context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_world))
        .route("/{world_id}", get(show_world))
        .route("/{world_id}/modules/{module_key}", patch(update_module))
        .route("/{world_id}/modules/{module_key}/retry", post(retry_module))
        .route("/{world_id}/publish/preview", get(publish_preview))
        .route("/{world_id}/publish", post(publish_world))
        .route("/{world_id}/generation-status", get(generation_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use worldforge_core::clock::Clock;
    use worldforge_worlds::application::scheduler::{
        GenerationPorts, GenerationScheduler, SchedulerConfig,
    };
    use worldforge_worlds::domain::repository::WorldStores;
    use worldforge_test_support::{
        FailingWorldStore, FixedClock, InMemoryWorldStore, ScriptedTextGenerator,
        StaticCredentials, StubPromptRenderer, fixed_now,
    };

    fn app_state_with(stores: WorldStores) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
        let ports = GenerationPorts {
            credentials: Arc::new(StaticCredentials::configured()),
            renderer: Arc::new(StubPromptRenderer::default()),
            generator: Arc::new(ScriptedTextGenerator::echo()),
        };
        let scheduler = Arc::new(GenerationScheduler::new(
            stores.clone(),
            ports,
            clock.clone(),
            SchedulerConfig::default(),
        ));
        AppState::new(stores, clock, scheduler)
    }

    fn test_app_state() -> AppState {
        app_state_with(WorldStores::from_shared(Arc::new(InMemoryWorldStore::new())))
    }

    fn failing_app_state() -> AppState {
        app_state_with(WorldStores::from_shared(Arc::new(FailingWorldStore)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn json_request(method: &str, uri: &str, user_id: Option<Uuid>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user_id) = user_id {
            builder = builder.header("x-user-id", user_id.to_string());
        }
        builder
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_world_returns_201_with_seven_empty_modules() {
        // Arrange
        let app = router().with_state(test_app_state());
        let owner_id = Uuid::new_v4();
        let body = json!({ "name": "Aldmere", "themes": ["decay", "renewal"] });

        // Act
        let (status, json) = send(app, json_request("POST", "/", Some(owner_id), &body)).await;

        // Assert
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["owner_id"], owner_id.to_string());
        assert_eq!(json["status"], "DRAFT");
        assert_eq!(json["version"], 0);
        let modules = json["modules"].as_array().unwrap();
        assert_eq!(modules.len(), 7);
        assert_eq!(modules[0]["module_key"], "cosmology");
        assert!(modules.iter().all(|module| module["status"] == "EMPTY"));
    }

    #[tokio::test]
    async fn test_create_world_without_user_header_returns_400() {
        // Arrange
        let app = router().with_state(test_app_state());
        let body = json!({ "name": "Aldmere" });

        // Act
        let (status, json) = send(app, json_request("POST", "/", None, &body)).await;

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_create_world_with_blank_name_returns_400() {
        // Arrange
        let app = router().with_state(test_app_state());
        let body = json!({ "name": "   " });

        // Act
        let (status, _) =
            send(app, json_request("POST", "/", Some(Uuid::new_v4()), &body)).await;

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_with_unknown_module_key_returns_400() {
        // Arrange
        let app = router().with_state(test_app_state());
        let uri = format!("/{}/modules/astrology", Uuid::new_v4());
        let body = json!({ "fields": { "origin": "Sung into being" } });

        // Act
        let (status, json) =
            send(app, json_request("PATCH", &uri, Some(Uuid::new_v4()), &body)).await;

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "validation error: unknown module key: astrology");
    }

    #[tokio::test]
    async fn test_show_unknown_world_returns_404() {
        // Arrange
        let app = router().with_state(test_app_state());
        let request = Request::builder()
            .uri(format!("/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        // Act
        let (status, json) = send(app, request).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "not_found");
    }

    #[tokio::test]
    async fn test_publish_returns_500_when_store_fails() {
        // Arrange
        let app = router().with_state(failing_app_state());
        let uri = format!("/{}/publish", Uuid::new_v4());

        // Act
        let (status, json) =
            send(app, json_request("POST", &uri, Some(Uuid::new_v4()), &json!({}))).await;

        // Assert
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "infrastructure_error");
    }

    #[tokio::test]
    async fn test_update_returns_422_for_missing_fields_object() {
        // Arrange
        let app = router().with_state(test_app_state());
        let uri = format!("/{}/modules/history", Uuid::new_v4());

        // Act
        let (status, _) =
            send(app, json_request("PATCH", &uri, Some(Uuid::new_v4()), &json!({}))).await;

        // Assert
        // Axum rejects bodies that fail to deserialize with 422.
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
