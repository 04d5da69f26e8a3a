//! Dynamic plugin dispatch
//!
//! Fallback handler for everything outside the fixed API surface. Requests
//! are gated before any plugin handler runs: first the service availability
//! flag, then the owning plugin's enabled state.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::ApiState;
use crate::plugins::DispatchOutcome;

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    msg: String,
}

fn reject(status: StatusCode, msg: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            code: status.as_u16(),
            msg: msg.into(),
        }),
    )
        .into_response()
}

/// Route a request to the plugin owning its namespace
pub async fn handle(State(state): State<Arc<ApiState>>, req: Request) -> Response {
    {
        let status = state.status.read().await;
        if !status.available {
            return reject(StatusCode::SERVICE_UNAVAILABLE, status.message.clone());
        }
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(ToString::to_string);

    match state.registry.dispatch(&path, &method).await {
        DispatchOutcome::Matched { handler, rel_path } => {
            handler
                .respond(
                    state.registry.http_client(),
                    &method,
                    &rel_path,
                    query.as_deref(),
                )
                .await
        }
        DispatchOutcome::Disabled { name } => {
            tracing::debug!(plugin = %name, %path, "request to disabled plugin");
            reject(
                StatusCode::FORBIDDEN,
                format!("plugin {name} is disabled"),
            )
        }
        DispatchOutcome::NoRoute { name } => {
            tracing::debug!(plugin = %name, %path, "no matching route");
            reject(StatusCode::NOT_FOUND, "no handler registered for path")
        }
        DispatchOutcome::NoPlugin => reject(StatusCode::NOT_FOUND, "no handler registered for path"),
    }
}
