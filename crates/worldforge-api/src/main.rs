//! Worldforge API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use worldforge_api::config::AppConfig;
use worldforge_api::error::AppError;
use worldforge_api::state::AppState;
use worldforge_core::clock::{Clock, SystemClock};
use worldforge_generation::{
    MiniJinjaPromptRenderer, OpenAiCompatibleGenerator, StaticCredentialsProvider,
};
use worldforge_store::pg_world_store::PgWorldStore;
use worldforge_worlds::application::scheduler::{GenerationPorts, GenerationScheduler};
use worldforge_worlds::domain::repository::WorldStores;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Worldforge API server");

    let config = AppConfig::from_env()?;

    // Create database connection pool and apply migrations.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgWorldStore::new(pool));
    store.migrate().await?;
    let stores = WorldStores::from_shared(store);

    // Generation collaborators.
    let renderer = match &config.prompts_path {
        Some(path) => {
            info!(path = %path.display(), "loading prompt catalog");
            MiniJinjaPromptRenderer::from_path(path)?
        }
        None => MiniJinjaPromptRenderer::embedded()?,
    };
    let credentials = StaticCredentialsProvider::from_settings(
        config.llm.api_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    );
    if !credentials.is_configured() {
        warn!("LLM provider is not configured; generation jobs will fail until it is");
    }
    let ports = GenerationPorts {
        credentials: Arc::new(credentials),
        renderer: Arc::new(renderer),
        generator: Arc::new(OpenAiCompatibleGenerator::new(config.llm.timeout)?),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Arc::new(GenerationScheduler::new(
        stores.clone(),
        ports,
        clock.clone(),
        config.scheduler,
    ));

    let cancel = CancellationToken::new();
    let scheduler_task = if config.scheduler_enabled {
        Some(tokio::spawn(
            scheduler
                .clone()
                .run(config.scheduler_interval, cancel.clone()),
        ))
    } else {
        info!("generation scheduler disabled on this instance");
        None
    };

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let app = worldforge_api::build_router(AppState::new(stores, clock, scheduler));

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_token = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await?;

    // The loop exits at its next select once the token fires.
    cancel.cancel();
    if let Some(task) = scheduler_task {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("generation scheduler did not stop within the grace period");
        }
    }

    info!("Worldforge API server stopped");
    Ok(())
}
