// ABOUTME: HTTP server for fieldtrail, exposing user CRUD and per-record history over REST.
// ABOUTME: All persistence flows through the save coordinator and the event log gateway.

pub mod api;
pub mod app_state;
pub mod config;
pub mod routes;

pub use app_state::{AppState, SharedState};
pub use config::{ConfigError, FieldtrailConfig};
pub use routes::create_router;
