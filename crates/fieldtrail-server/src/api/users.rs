// ABOUTME: User API handlers: list, create, details with history, edit, and removal scheduling.
// ABOUTME: Every mutation goes through the save coordinator; history reads go through the gateway.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use fieldtrail_core::{RecordedEvent, User};
use fieldtrail_store::{EventStore, SaveError, TrackedUser, UserStore};
use serde::{Deserialize, Serialize};

use crate::app_state::SharedState;

/// A user as exposed over the API. The hashed credential never leaves the
/// server.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email_address: String,
    pub email_verified: bool,
    pub removed_at: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email_address: user.email_address.clone(),
            email_verified: user.email_verified,
            removed_at: user.removed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Request body for creating a user. The password arrives pre-hashed;
/// hashing is the caller's concern.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email_address: String,
    pub hashed_password: String,
}

/// Request body for editing a user. Absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email_address: Option<String>,
    pub hashed_password: Option<String>,
    pub email_verified: Option<bool>,
}

/// Details response: the record plus its change history, newest first.
#[derive(Debug, Serialize)]
pub struct UserDetailsResponse {
    pub user: UserResponse,
    pub events: Vec<RecordedEvent>,
}

/// GET /api/users - List all users.
pub async fn list_users(State(state): State<SharedState>) -> impl IntoResponse {
    let conn = match state.store.connect() {
        Ok(conn) => conn,
        Err(e) => return store_failure("list users", e),
    };

    match UserStore::list(&conn) {
        Ok(users) => {
            let body: Vec<UserResponse> = users.iter().map(UserResponse::from).collect();
            Json(body).into_response()
        }
        Err(e) => store_failure("list users", e),
    }
}

/// POST /api/users - Create a user.
pub async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    let user = User::new(req.email_address, req.hashed_password);

    match state.coordinator.save(vec![TrackedUser::added(user)]).await {
        Ok(outcome) => {
            let user = &outcome.users[0];
            (
                StatusCode::CREATED,
                Json(serde_json::json!({ "id": user.id })),
            )
                .into_response()
        }
        Err(e) => save_failure("create user", e),
    }
}

/// GET /api/users/{id} - A user and its change history.
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let user = match load_user(&state, id) {
        Ok(Some(user)) => user,
        Ok(None) => return not_found(),
        Err(resp) => return resp,
    };

    // History reads never touch the primary store; a degraded log store
    // degrades history, not the record itself.
    let events = match state
        .gateway
        .read(&user.stream_key(), state.history_limit)
        .await
    {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!("history read for {} failed: {}", user.stream_key(), e);
            Vec::new()
        }
    };

    Json(UserDetailsResponse {
        user: UserResponse::from(&user),
        events,
    })
    .into_response()
}

/// PUT /api/users/{id} - Edit a user. Fields that end up unchanged produce
/// no audit events.
pub async fn update_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    let mut user = match load_user(&state, id) {
        Ok(Some(user)) => user,
        Ok(None) => return not_found(),
        Err(resp) => return resp,
    };

    if let Some(email) = req.email_address {
        user.set_email_address(email);
    }
    if let Some(hashed_password) = req.hashed_password {
        user.hashed_password = hashed_password;
    }
    if let Some(email_verified) = req.email_verified {
        user.email_verified = email_verified;
    }

    match state
        .coordinator
        .save(vec![TrackedUser::modified(user)])
        .await
    {
        Ok(outcome) => Json(UserResponse::from(&outcome.users[0])).into_response(),
        Err(e) => save_failure("update user", e),
    }
}

/// DELETE /api/users/{id} - Schedule a user for removal. Sets the removal
/// timestamp; the retention reaper purges the row and its stream once the
/// grace window elapses.
pub async fn schedule_removal(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let mut user = match load_user(&state, id) {
        Ok(Some(user)) => user,
        Ok(None) => return not_found(),
        Err(resp) => return resp,
    };

    if user.removed_at.is_none() {
        user.removed_at = Some(Utc::now());
        match state
            .coordinator
            .save(vec![TrackedUser::modified(user)])
            .await
        {
            Ok(outcome) => return Json(UserResponse::from(&outcome.users[0])).into_response(),
            Err(e) => return save_failure("schedule removal", e),
        }
    }

    // Already scheduled; nothing to change.
    Json(UserResponse::from(&user)).into_response()
}

fn load_user(
    state: &SharedState,
    id: i64,
) -> Result<Option<User>, axum::response::Response> {
    let conn = state
        .store
        .connect()
        .map_err(|e| store_failure("load user", e))?;
    UserStore::get(&conn, id).map_err(|e| store_failure("load user", e))
}

fn not_found() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "user not found" })),
    )
        .into_response()
}

fn store_failure(action: &str, e: fieldtrail_store::StoreError) -> axum::response::Response {
    tracing::error!("failed to {}: {}", action, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": format!("failed to {action}") })),
    )
        .into_response()
}

fn save_failure(action: &str, e: SaveError) -> axum::response::Response {
    tracing::error!("failed to {}: {}", action, e);
    let status = match e {
        // Constraint violations (duplicate email) surface as commit failures.
        SaveError::Commit(_) => StatusCode::CONFLICT,
        SaveError::Snapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({ "error": format!("failed to {action}: {e}") })),
    )
        .into_response()
}
