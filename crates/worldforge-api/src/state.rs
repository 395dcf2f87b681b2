//! Shared application state.

use std::sync::Arc;

use worldforge_core::clock::Clock;
use worldforge_worlds::application::scheduler::GenerationScheduler;
use worldforge_worlds::domain::repository::WorldStores;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// World, module and job repositories.
    pub stores: WorldStores,
    /// Clock for timestamps.
    pub clock: Arc<dyn Clock>,
    /// Generation scheduler; handles retries and runs the background loop.
    pub scheduler: Arc<GenerationScheduler>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        stores: WorldStores,
        clock: Arc<dyn Clock>,
        scheduler: Arc<GenerationScheduler>,
    ) -> Self {
        Self {
            stores,
            clock,
            scheduler,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("stores", &self.stores)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
