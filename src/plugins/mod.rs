//! Plugin system for Portico
//!
//! Plugins are TOML manifests in the plugin directory, one file per plugin.
//! Each manifest declares its metadata and either a single catch-all handler
//! or a list of routes. The registry owns the live route table; the watcher
//! feeds it debounced filesystem changes so edits on disk take effect
//! without a restart.

pub mod handler;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod table;
pub mod watcher;

pub use handler::Handler;
pub use loader::{LoadedPlugin, load, plugin_name};
pub use manifest::{HandlerSpec, PLUGIN_EXTENSION, PluginInfo, PluginManifest, RouteSpec};
pub use registry::{DispatchOutcome, LoadFailure, PluginRegistry, PluginSnapshot};
pub use table::{HandlerSet, RouteBinding, RouteTable};
pub use watcher::{ChangeKind, ChangeSink, DEFAULT_DEBOUNCE, Debouncer, PluginWatcher};
