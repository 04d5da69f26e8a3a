//! Portico - HTTP server with hot-loaded request-handling plugins
//!
//! Portico serves a dynamic HTTP surface assembled from plugin manifests in
//! a directory. Each plugin claims a namespace under `/<name>` and declares
//! its handlers; editing, adding, or deleting a manifest takes effect
//! without a restart.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP surface                       │
//! │   /api/admin  │  /health  /ready  │  /<plugin>/...  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Plugin registry                      │
//! │   descriptors  │  route table  │  failure log       │
//! └────────────────────▲────────────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────────────┐
//! │          Watcher + debouncer + loader                │
//! │   plugins/*.toml on disk                             │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod plugins;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use plugins::{
    DispatchOutcome, Handler, LoadFailure, PluginManifest, PluginRegistry, PluginSnapshot,
    PluginWatcher,
};
