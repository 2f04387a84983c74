// ABOUTME: Route definitions for the fieldtrail HTTP API.
// ABOUTME: Assembles the user endpoints into a single Axum Router with shared state.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;

/// Build the complete Axum router with all routes and shared state.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/api/users/{id}",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::schedule_removal),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler. Returns 200 OK with a simple JSON body.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
