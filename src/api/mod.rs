//! HTTP API server for Portico
//!
//! Two surfaces share one listener: the admin API under `/api/admin` plus
//! health probes, and the dynamic plugin surface, which is the router
//! fallback so plugin namespaces never collide with fixed routes.

pub mod admin;
mod auth;
pub mod dispatch;
pub mod health;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::plugins::PluginRegistry;

/// Service availability, toggled through the admin API.
///
/// While unavailable, every plugin-surface request is answered with 503
/// before any handler runs. Admin and health endpoints stay reachable.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub available: bool,
    pub message: String,
    pub changed_at: DateTime<Utc>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            available: true,
            message: "service available".to_string(),
            changed_at: Utc::now(),
        }
    }
}

/// Shared state for API handlers
pub struct ApiState {
    pub registry: Arc<PluginRegistry>,
    pub api_key: Option<String>,
    pub plugin_dir: PathBuf,
    pub status: RwLock<ServiceStatus>,
}

impl ApiState {
    #[must_use]
    pub fn new(registry: Arc<PluginRegistry>, api_key: Option<String>, plugin_dir: PathBuf) -> Self {
        Self {
            registry,
            api_key,
            plugin_dir,
            status: RwLock::new(ServiceStatus::default()),
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: Arc<ApiState>, host: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            host: host.into(),
            port,
        }
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        // Plugin dispatch is the fallback, so fixed routes always win
        let plugin_surface = Router::new()
            .fallback(dispatch::handle)
            .with_state(self.state.clone());

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        plugin_surface
            .nest("/api/admin", admin::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` resolves, then stop accepting
    /// connections and drain in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns error if the listener fails to bind or the server fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
