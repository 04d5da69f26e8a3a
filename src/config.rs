//! Configuration management for Portico

use std::path::PathBuf;
use std::time::Duration;

use crate::plugins::watcher::DEFAULT_DEBOUNCE;

/// Portico configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Directory holding plugin manifests
    pub plugin_dir: PathBuf,

    /// Filesystem watcher configuration
    pub watch: WatchConfig,

    /// API key for admin endpoints (from `PORTICO_API_KEY` env)
    pub api_key: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

/// Filesystem watcher configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Watch the plugin directory for changes
    pub enabled: bool,

    /// Quiet window applied to create and modify events
    pub debounce: Duration,
}

impl Config {
    /// Load configuration from the environment
    #[must_use]
    pub fn load() -> Self {
        let server = ServerConfig {
            host: std::env::var("PORTICO_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORTICO_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
        };

        let plugin_dir = std::env::var("PORTICO_PLUGIN_DIR")
            .map_or_else(|_| default_plugin_dir(), PathBuf::from);

        let watch = WatchConfig {
            enabled: !std::env::var("PORTICO_WATCH")
                .is_ok_and(|v| v == "0" || v.eq_ignore_ascii_case("false")),
            debounce: std::env::var("PORTICO_DEBOUNCE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_DEBOUNCE, Duration::from_millis),
        };

        Self {
            server,
            plugin_dir,
            watch,
            api_key: std::env::var("PORTICO_API_KEY").ok(),
        }
    }
}

/// Default plugin directory
///
/// A `plugins/` directory next to the working directory wins; otherwise the
/// XDG data directory is used (`~/.local/share/portico/plugins` on Linux).
pub fn default_plugin_dir() -> PathBuf {
    let local = PathBuf::from("plugins");
    if local.is_dir() {
        return local;
    }

    directories::ProjectDirs::from("dev", "portico", "portico")
        .map_or(local, |d| d.data_dir().join("plugins"))
}
