// ABOUTME: Shared application state for the fieldtrail HTTP server.
// ABOUTME: Bundles the save coordinator, primary store, and event log gateway behind an Arc.

use std::sync::Arc;

use fieldtrail_store::{EventStore, SaveCoordinator, UserStore};

/// Shared state accessible by all Axum handlers. The store and gateway are
/// the same instances the coordinator writes through, so handlers read what
/// was saved.
pub struct AppState {
    pub coordinator: SaveCoordinator,
    pub store: UserStore,
    pub gateway: Arc<dyn EventStore>,
    pub history_limit: usize,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Create a new AppState around an opened store and gateway.
    pub fn new(store: UserStore, gateway: Arc<dyn EventStore>, history_limit: usize) -> Self {
        let coordinator = SaveCoordinator::new(store.clone(), Arc::clone(&gateway));
        Self {
            coordinator,
            store,
            gateway,
            history_limit,
        }
    }
}
