//! Plugin registry
//!
//! The registry owns the descriptor map and the live route table and is the
//! single writer of both. Loading and handler construction happen outside
//! the lock; the critical section only swaps references, so a slow plugin
//! load never stalls request dispatch for already-installed plugins.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

use super::handler::Handler;
use super::loader::{self, LoadedPlugin};
use super::manifest::PluginInfo;
use super::table::{self, HandlerSet, RouteTable};
use super::watcher::{ChangeKind, ChangeSink};

/// Maximum retained load failures
const FAILURE_LOG_CAP: usize = 100;

/// One plugin known to the registry
#[derive(Debug)]
struct PluginDescriptor {
    /// Unique name, derived from the source file stem
    name: String,
    /// File the descriptor was loaded from
    source_path: PathBuf,
    /// Detached from the route table when false; descriptor stays
    enabled: bool,
    /// Metadata with defaults applied
    info: PluginInfo,
    /// Load generation of the current handler set
    generation: u64,
    /// Route bindings owned by this descriptor; installed iff `enabled`
    handler_set: Arc<HandlerSet>,
}

/// Read-only snapshot of one plugin, safe to hand to the API layer
#[derive(Debug, Clone, Serialize)]
pub struct PluginSnapshot {
    pub name: String,
    pub path: PathBuf,
    pub enabled: bool,
    pub generation: u64,
    pub routes: usize,
    pub version: String,
    pub author: String,
    pub description: String,
    pub category: String,
}

impl PluginSnapshot {
    fn of(desc: &PluginDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            path: desc.source_path.clone(),
            enabled: desc.enabled,
            generation: desc.generation,
            routes: desc.handler_set.len(),
            version: desc.info.version.clone(),
            author: desc.info.author.clone(),
            description: desc.info.description.clone(),
            category: desc.info.category.clone(),
        }
    }
}

/// A recorded plugin load failure
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub name: String,
    pub path: PathBuf,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Where a request under a plugin namespace should go
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No plugin owns the path
    NoPlugin,
    /// The owning plugin is disabled; reject before any handler runs
    Disabled { name: String },
    /// The owning plugin has no route for this path/method
    NoRoute { name: String },
    /// A handler matched; execute it outside the registry lock
    Matched {
        handler: Handler,
        /// Request path with the plugin namespace stripped
        rel_path: String,
    },
}

/// Descriptor map and route table, guarded together so they never diverge
#[derive(Debug, Default)]
struct Inner {
    /// Keyed by lowercased plugin name
    plugins: HashMap<String, PluginDescriptor>,
    table: RouteTable,
    failures: Vec<LoadFailure>,
}

/// The authoritative owner of plugin state and sole writer of the route table
#[derive(Debug)]
pub struct PluginRegistry {
    inner: RwLock<Inner>,
    /// Plugin names with a load currently in flight; a second load for the
    /// same name coalesces into the live state instead of queueing
    loading: StdMutex<HashSet<String>>,
    /// Source of monotonic load generations
    generation: AtomicU64,
    /// Shared HTTP client for proxy handlers
    client: reqwest::Client,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            loading: StdMutex::new(HashSet::new()),
            generation: AtomicU64::new(0),
            client: reqwest::Client::new(),
        }
    }

    /// HTTP client shared by proxy handlers
    #[must_use]
    pub const fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Load every plugin file in `dir`, creating the directory if missing.
    ///
    /// Individual load failures are recorded, not raised, so one broken
    /// plugin cannot block startup of the others. Returns the number of
    /// plugins loaded successfully.
    ///
    /// # Errors
    ///
    /// Returns error only when the directory cannot be created or read.
    pub async fn load_directory(&self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            tracing::info!(path = %dir.display(), "plugin directory missing, creating");
            std::fs::create_dir_all(dir)?;
            return Ok(0);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| loader::plugin_name(path).is_some())
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.apply_load(&path).await {
                Ok(snapshot) => {
                    tracing::info!(
                        plugin = %snapshot.name,
                        version = %snapshot.version,
                        "plugin loaded"
                    );
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "plugin failed to load");
                }
            }
        }

        Ok(loaded)
    }

    /// Load (or reload) the plugin at `path` and swap it into the table.
    ///
    /// On success the old descriptor's bindings are removed and the new set
    /// installed in one critical section. On failure the previous state is
    /// left untouched and the error is recorded and returned. When another
    /// load for the same name is already in flight the call returns the
    /// current snapshot without loading.
    ///
    /// # Errors
    ///
    /// Returns the loader's `Import`/`Contract`/`RouteSetup` error, or
    /// `RouteSetup` on a name conflict with another source file.
    pub async fn apply_load(&self, path: &Path) -> Result<PluginSnapshot> {
        self.apply_load_inner(path, None).await
    }

    async fn apply_load_inner(
        &self,
        path: &Path,
        enable_override: Option<bool>,
    ) -> Result<PluginSnapshot> {
        // Build the new handler set in isolation, outside any lock
        let loaded = match loader::load(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.record_failure(path, &e).await;
                return Err(e);
            }
        };

        let key = loaded.name.to_ascii_lowercase();
        if !self.begin_load(&key) {
            // An admin reload and a settled watcher event can race here;
            // report the live state instead of queueing a second load
            tracing::debug!(plugin = %loaded.name, "load already in flight, keeping current state");
            let inner = self.inner.read().await;
            return inner
                .plugins
                .get(&key)
                .map(PluginSnapshot::of)
                .ok_or_else(|| Error::NotFound(format!("plugin {}", loaded.name)));
        }
        let result = self.install(&key, loaded, enable_override).await;
        self.finish_load(&key);
        result
    }

    async fn install(
        &self,
        key: &str,
        loaded: LoadedPlugin,
        enable_override: Option<bool>,
    ) -> Result<PluginSnapshot> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.plugins.get(key) {
            if existing.source_path != loaded.source_path {
                drop(inner);
                let e = Error::RouteSetup(format!(
                    "plugin name {:?} already claimed by {}",
                    loaded.name,
                    loaded.source_path.display()
                ));
                self.record_failure(&loaded.source_path, &e).await;
                return Err(e);
            }
        }

        let enabled = enable_override
            .or_else(|| inner.plugins.get(key).map(|d| d.enabled))
            .unwrap_or(true);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let LoadedPlugin {
            name,
            source_path,
            info,
            catch_all,
            bindings,
        } = loaded;

        let set = Arc::new(HandlerSet {
            generation,
            catch_all,
            bindings,
        });

        // Swap descriptor and table together; readers never see a mix
        inner.table.remove(key);
        if enabled {
            inner.table.install(key, set.clone());
        }
        let descriptor = PluginDescriptor {
            name,
            source_path,
            enabled,
            info,
            generation,
            handler_set: set,
        };
        let snapshot = PluginSnapshot::of(&descriptor);
        inner.plugins.insert(key.to_string(), descriptor);

        Ok(snapshot)
    }

    /// Remove a plugin's routes and descriptor. Idempotent: removing an
    /// unknown name is a no-op success.
    pub async fn remove(&self, name: &str) {
        let key = name.to_ascii_lowercase();
        let mut inner = self.inner.write().await;
        inner.table.remove(&key);
        if inner.plugins.remove(&key).is_some() {
            tracing::info!(plugin = %name, "plugin removed");
        }
    }

    /// Reload a known plugin from its stored source path.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name, or the load error.
    pub async fn reload(&self, name: &str) -> Result<PluginSnapshot> {
        let path = {
            let inner = self.inner.read().await;
            let desc = inner
                .plugins
                .get(&name.to_ascii_lowercase())
                .ok_or_else(|| Error::NotFound(format!("plugin {name}")))?;
            desc.source_path.clone()
        };
        self.apply_load(&path).await
    }

    /// Enable or disable a plugin.
    ///
    /// Enabling re-runs the load from the stored source path, so a
    /// disabled-then-enabled plugin always reflects the latest file on disk;
    /// enabling an already-enabled plugin is a no-op. Disabling detaches the
    /// plugin's bindings without touching the descriptor or its metadata.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name, or the load error when
    /// enabling a plugin whose file no longer loads.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<PluginSnapshot> {
        let key = name.to_ascii_lowercase();

        if enabled {
            let path = {
                let inner = self.inner.read().await;
                let desc = inner
                    .plugins
                    .get(&key)
                    .ok_or_else(|| Error::NotFound(format!("plugin {name}")))?;
                if desc.enabled {
                    // Already live; do not re-register bindings
                    return Ok(PluginSnapshot::of(desc));
                }
                desc.source_path.clone()
            };
            let snapshot = self.apply_load_inner(&path, Some(true)).await?;
            tracing::info!(plugin = %name, "plugin enabled");
            Ok(snapshot)
        } else {
            let mut inner = self.inner.write().await;
            inner.table.remove(&key);
            let desc = inner
                .plugins
                .get_mut(&key)
                .ok_or_else(|| Error::NotFound(format!("plugin {name}")))?;
            desc.enabled = false;
            tracing::info!(plugin = %name, "plugin disabled");
            Ok(PluginSnapshot::of(desc))
        }
    }

    /// Snapshot all plugins, ordered by name
    pub async fn list(&self) -> Vec<PluginSnapshot> {
        let inner = self.inner.read().await;
        let mut plugins: Vec<PluginSnapshot> =
            inner.plugins.values().map(PluginSnapshot::of).collect();
        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        plugins
    }

    /// Resolve the plugin owning a request path, enabled or not.
    ///
    /// Longest-prefix match over `/<name>` namespaces with segment
    /// boundaries; used by the request-gating layer to reject disabled
    /// plugins before their handlers run.
    pub async fn resolve_by_path(&self, request_path: &str) -> Option<PluginSnapshot> {
        let key = table::namespace_key(request_path)?;
        let inner = self.inner.read().await;
        inner.plugins.get(&key).map(PluginSnapshot::of)
    }

    /// Resolve a request to a concrete handler, cloned out of the table so
    /// execution happens with no lock held.
    pub async fn dispatch(&self, request_path: &str, method: &Method) -> DispatchOutcome {
        let Some(key) = table::namespace_key(request_path) else {
            return DispatchOutcome::NoPlugin;
        };

        let inner = self.inner.read().await;
        let Some(desc) = inner.plugins.get(&key) else {
            return DispatchOutcome::NoPlugin;
        };
        if !desc.enabled {
            return DispatchOutcome::Disabled {
                name: desc.name.clone(),
            };
        }

        let Some(set) = inner.table.get(&key) else {
            // enabled implies installed; kept as a belt against future edits
            return DispatchOutcome::NoRoute {
                name: desc.name.clone(),
            };
        };
        let rel = table::relative_path(request_path, &key);
        match set.find(rel, method) {
            Some(handler) => DispatchOutcome::Matched {
                handler: handler.clone(),
                rel_path: rel.to_string(),
            },
            None => DispatchOutcome::NoRoute {
                name: desc.name.clone(),
            },
        }
    }

    /// Recorded load failures, oldest first
    pub async fn load_failures(&self) -> Vec<LoadFailure> {
        self.inner.read().await.failures.clone()
    }

    /// Number of known plugins
    pub async fn len(&self) -> usize {
        self.inner.read().await.plugins.len()
    }

    /// Number of plugins with routes currently installed; disabled plugins
    /// are known but not installed
    pub async fn installed(&self) -> usize {
        self.inner.read().await.table.len()
    }

    /// Whether no plugins are known
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.plugins.is_empty()
    }

    async fn record_failure(&self, path: &Path, error: &Error) {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let mut inner = self.inner.write().await;
        if inner.failures.len() >= FAILURE_LOG_CAP {
            inner.failures.remove(0);
        }
        inner.failures.push(LoadFailure {
            name,
            path: path.to_path_buf(),
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    /// Mark a name as loading; returns false when a load is already in
    /// flight (the caller answers with current state rather than queueing)
    fn begin_load(&self, name: &str) -> bool {
        self.loading
            .lock()
            .map(|mut set| set.insert(name.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    fn finish_load(&self, name: &str) {
        if let Ok(mut set) = self.loading.lock() {
            set.remove(&name.to_ascii_lowercase());
        }
    }
}

#[async_trait]
impl ChangeSink for PluginRegistry {
    async fn on_path_changed(&self, path: &Path, kind: ChangeKind) {
        let Some(name) = loader::plugin_name(path) else {
            return;
        };

        match kind {
            ChangeKind::Created | ChangeKind::Changed => {
                match self.apply_load(path).await {
                    Ok(snapshot) => {
                        tracing::info!(
                            plugin = %snapshot.name,
                            generation = snapshot.generation,
                            "plugin reloaded"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(plugin = %name, error = %e, "plugin reload failed");
                    }
                }
            }
            ChangeKind::Removed => {
                self.remove(&name).await;
            }
        }
    }
}
