//! Plugin manifest format (`<name>.toml`)
//!
//! A plugin is a single TOML file in the plugin directory. The file stem is
//! the plugin's unique name and its URL namespace is `/<name>`. A manifest
//! must export exactly one of two shapes: a top-level `[handler]` serving
//! every path under the namespace, or one or more `[[route]]` entries.

use serde::{Deserialize, Serialize};

/// File extension recognized as a plugin
pub const PLUGIN_EXTENSION: &str = "toml";

/// Default version when a manifest omits one
pub const DEFAULT_VERSION: &str = "1.0.0";
/// Default author when a manifest omits one
pub const DEFAULT_AUTHOR: &str = "unknown";
/// Default description when a manifest omits one
pub const DEFAULT_DESCRIPTION: &str = "no description";
/// Default category when a manifest omits one
pub const DEFAULT_CATEGORY: &str = "unclassified";

/// Raw manifest as written in a plugin file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// Optional metadata block, defaulted field by field when absent
    #[serde(default)]
    pub plugin_info: PluginInfo,

    /// Shape (a): a single handler for any method/path under the namespace
    #[serde(default)]
    pub handler: Option<HandlerSpec>,

    /// Shape (b): explicit routes under the namespace
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteSpec>,
}

/// Free-form plugin metadata with documented defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PluginInfo {
    /// Display name; defaults to the file stem when omitted
    pub name: Option<String>,
    /// Semver-ish version string
    pub version: String,
    /// Plugin author
    pub author: String,
    /// Short description
    pub description: String,
    /// Category label
    pub category: String,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            name: None,
            version: DEFAULT_VERSION.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

/// What a handler does when a request reaches it
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HandlerSpec {
    /// Respond with a fixed status and JSON body
    Static {
        /// HTTP status code, defaults to 200
        #[serde(default = "default_status")]
        status: u16,
        /// JSON body returned verbatim
        #[serde(default)]
        body: serde_json::Value,
    },
    /// Reflect method, path, and query back as JSON
    Echo,
    /// Forward the request to an upstream URL
    Proxy {
        /// Absolute http(s) URL the request is forwarded to
        upstream: String,
        /// Append the inbound query string to the upstream URL
        #[serde(default = "default_true")]
        forward_query: bool,
    },
}

const fn default_status() -> u16 {
    200
}

const fn default_true() -> bool {
    true
}

/// One explicit route within a plugin's namespace
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSpec {
    /// Path under the plugin namespace, e.g. `/lookup`; `/` is the root
    pub path: String,
    /// HTTP method restriction; any method when omitted
    #[serde(default)]
    pub method: Option<String>,
    /// Handler invoked when the route matches
    pub handler: HandlerSpec,
}
