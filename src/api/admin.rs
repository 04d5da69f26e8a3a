//! Admin API endpoints
//!
//! Plugin lifecycle control (list, enable, disable, reload, remove), the
//! load-failure log, and the service availability toggle. All routes sit
//! behind the API key middleware.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiState, auth::require_api_key};
use crate::Error;
use crate::plugins::{LoadFailure, PluginSnapshot};

// --- Request/Response types ---

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub msg: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub available: bool,
    pub message: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub available: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn error_body(status: StatusCode, msg: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody {
        code: status.as_u16(),
        msg: msg.into(),
    })
}

/// Map registry errors onto admin responses. Load errors are the client's
/// plugin being at fault, not the server, so they answer 422.
fn map_error(e: &Error) -> (StatusCode, Json<ErrorBody>) {
    let status = match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_load_error() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error_body(status, e.to_string()))
}

// --- Handlers ---

/// List all plugins, enabled and disabled
async fn list_plugins(State(state): State<Arc<ApiState>>) -> Json<Vec<PluginSnapshot>> {
    Json(state.registry.list().await)
}

/// Enable a plugin, reloading it from disk
async fn enable_plugin(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<PluginSnapshot>, (StatusCode, Json<ErrorBody>)> {
    let snapshot = state
        .registry
        .set_enabled(&name, true)
        .await
        .map_err(|e| map_error(&e))?;
    Ok(Json(snapshot))
}

/// Disable a plugin, detaching its routes
async fn disable_plugin(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<PluginSnapshot>, (StatusCode, Json<ErrorBody>)> {
    let snapshot = state
        .registry
        .set_enabled(&name, false)
        .await
        .map_err(|e| map_error(&e))?;
    Ok(Json(snapshot))
}

/// Reload a plugin from its source file
async fn reload_plugin(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<PluginSnapshot>, (StatusCode, Json<ErrorBody>)> {
    let snapshot = state
        .registry
        .reload(&name)
        .await
        .map_err(|e| map_error(&e))?;
    Ok(Json(snapshot))
}

/// Remove a plugin from the registry. Idempotent; the file on disk is left
/// alone.
async fn remove_plugin(State(state): State<Arc<ApiState>>, Path(name): Path<String>) -> StatusCode {
    state.registry.remove(&name).await;
    StatusCode::NO_CONTENT
}

/// Recorded plugin load failures, oldest first
async fn list_failures(State(state): State<Arc<ApiState>>) -> Json<Vec<LoadFailure>> {
    Json(state.registry.load_failures().await)
}

/// Current service availability
async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let status = state.status.read().await;
    Json(StatusResponse {
        available: status.available,
        message: status.message.clone(),
        changed_at: status.changed_at,
    })
}

/// Toggle service availability
async fn set_status(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SetStatusRequest>,
) -> Json<StatusResponse> {
    let mut status = state.status.write().await;
    status.available = req.available;
    status.message = req.message.unwrap_or_else(|| {
        if req.available {
            "service available".to_string()
        } else {
            "service unavailable".to_string()
        }
    });
    status.changed_at = Utc::now();
    tracing::info!(available = status.available, "service availability changed");

    Json(StatusResponse {
        available: status.available,
        message: status.message.clone(),
        changed_at: status.changed_at,
    })
}

/// Build admin router with auth middleware
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/plugins", get(list_plugins))
        .route("/plugins/{name}/enable", post(enable_plugin))
        .route("/plugins/{name}/disable", post(disable_plugin))
        .route("/plugins/{name}/reload", post(reload_plugin))
        .route("/plugins/{name}", delete(remove_plugin))
        .route("/failures", get(list_failures))
        .route("/status", get(get_status))
        .route("/status", post(set_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}
