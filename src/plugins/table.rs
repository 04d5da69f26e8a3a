//! Live route table
//!
//! Maps plugin namespaces to installed handler sets. The table is owned by
//! the registry, which is its only writer; request dispatch reads it through
//! cheap `Arc` snapshots so reloads never block traffic to other plugins.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use super::handler::Handler;

/// One registered route binding owned by a plugin
#[derive(Debug, Clone)]
pub struct RouteBinding {
    /// Path relative to the plugin namespace; `/` is the namespace root
    pub path: String,
    /// Method restriction; `None` accepts any method
    pub method: Option<Method>,
    /// Handler invoked when the binding matches
    pub handler: Handler,
}

/// One generation of a plugin's installed routes.
///
/// Each successful load produces a fresh set with a new generation number;
/// the registry swaps whole sets, never individual bindings.
#[derive(Debug)]
pub struct HandlerSet {
    /// Monotonic load generation, assigned by the registry at install time
    pub generation: u64,
    /// Catch-all handler serving every path under the namespace (shape a)
    pub catch_all: Option<Handler>,
    /// Explicit route bindings (shape b)
    pub bindings: Vec<RouteBinding>,
}

impl HandlerSet {
    /// Find the handler for a path relative to the plugin namespace
    #[must_use]
    pub fn find(&self, rel_path: &str, method: &Method) -> Option<&Handler> {
        if let Some(handler) = &self.catch_all {
            return Some(handler);
        }
        self.bindings
            .iter()
            .find(|b| {
                b.path.eq_ignore_ascii_case(rel_path)
                    && b.method.as_ref().is_none_or(|m| m == method)
            })
            .map(|b| &b.handler)
    }

    /// Number of route bindings (1 for a catch-all set)
    #[must_use]
    pub fn len(&self) -> usize {
        if self.catch_all.is_some() {
            1
        } else {
            self.bindings.len()
        }
    }

    /// Whether the set carries no handlers at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catch_all.is_none() && self.bindings.is_empty()
    }
}

/// The live mapping from plugin namespaces to handler sets
#[derive(Debug, Default)]
pub struct RouteTable {
    /// Keyed by lowercased plugin name
    entries: HashMap<String, Arc<HandlerSet>>,
}

impl RouteTable {
    /// Install (or replace) the handler set owned by `name`
    pub fn install(&mut self, name: &str, set: Arc<HandlerSet>) {
        self.entries.insert(name.to_ascii_lowercase(), set);
    }

    /// Remove the handler set owned by `name`; returns whether one existed
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(&name.to_ascii_lowercase()).is_some()
    }

    /// Snapshot the handler set owned by `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<HandlerSet>> {
        self.entries.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Number of installed plugins
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugin is installed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract the owning namespace key (lowercased plugin name) from a request
/// path.
///
/// A plugin named `echo` owns `/echo` and everything under `/echo/`, with a
/// segment boundary: `/echoes` belongs to a different namespace. Because
/// names are single path segments, matching the first segment is exactly the
/// longest-prefix match over `/<name>` namespaces.
#[must_use]
pub fn namespace_key(request_path: &str) -> Option<String> {
    let trimmed = request_path.strip_prefix('/').unwrap_or(request_path);
    let segment = trimmed.split('/').next().unwrap_or_default();
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_ascii_lowercase())
    }
}

/// Rewrite a request path relative to its owning namespace.
///
/// `/echo` becomes `/`, `/echo/lookup` becomes `/lookup`.
#[must_use]
pub fn relative_path<'a>(request_path: &'a str, name: &str) -> &'a str {
    let trimmed = request_path.strip_prefix('/').unwrap_or(request_path);
    let rest = &trimmed[name.len().min(trimmed.len())..];
    if rest.is_empty() { "/" } else { rest }
}
