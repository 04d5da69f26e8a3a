//! Shared test utilities

use std::path::{Path, PathBuf};
use std::sync::Arc;

use portico::PluginRegistry;
use portico::api::{ApiServer, ApiState};

/// Catch-all echo plugin
pub const ECHO_PLUGIN: &str = r#"
[plugin_info]
description = "echoes request details"

[handler]
kind = "echo"
"#;

/// Route-list plugin with a versioned static endpoint
pub const INFO_PLUGIN: &str = r#"
[plugin_info]
version = "1.2.0"
category = "metadata"

[[route]]
path = "/version"
method = "GET"

[route.handler]
kind = "static"

[route.handler.body]
version = "1.2.0"

[[route]]
path = "/status"

[route.handler]
kind = "static"

[route.handler.body]
running = true
"#;

/// Write a plugin manifest into `dir`
pub fn write_plugin(dir: &Path, file: &str, contents: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, contents).expect("failed to write plugin manifest");
    path
}

/// Registry preloaded from `dir`
pub async fn setup_registry(dir: &Path) -> Arc<PluginRegistry> {
    let registry = Arc::new(PluginRegistry::new());
    registry
        .load_directory(dir)
        .await
        .expect("failed to load plugin directory");
    registry
}

/// Full application router with admin auth enabled
pub fn build_router(registry: Arc<PluginRegistry>, plugin_dir: &Path) -> axum::Router {
    let state = Arc::new(ApiState::new(
        registry,
        Some("test-api-key".to_string()),
        plugin_dir.to_path_buf(),
    ));
    ApiServer::new(state, "127.0.0.1", 0).router()
}
