//! Plugin loader
//!
//! Turns a plugin file path into a validated, ready-to-install unit. The
//! loader builds the plugin's private handler set in isolation and never
//! touches the live route table; installation is the registry's exclusive
//! privilege.

use std::path::{Path, PathBuf};

use axum::http::{Method, StatusCode};

use crate::error::{Error, Result};

use super::handler::Handler;
use super::manifest::{HandlerSpec, PLUGIN_EXTENSION, PluginInfo, PluginManifest, RouteSpec};
use super::table::RouteBinding;

/// A successfully loaded plugin, not yet installed anywhere
#[derive(Debug)]
pub struct LoadedPlugin {
    /// Unique name, derived from the file stem
    pub name: String,
    /// Path the plugin was loaded from
    pub source_path: PathBuf,
    /// Metadata with defaults applied
    pub info: PluginInfo,
    /// Catch-all handler (shape a), mutually exclusive with `bindings`
    pub catch_all: Option<Handler>,
    /// Explicit route bindings (shape b)
    pub bindings: Vec<RouteBinding>,
}

/// Derive a plugin name from its file path.
///
/// Returns `None` for hidden files and files without the plugin extension.
#[must_use]
pub fn plugin_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') {
        return None;
    }
    if path.extension()? != PLUGIN_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str().map(ToString::to_string)
}

/// Load and validate a plugin file.
///
/// # Errors
///
/// - [`Error::Import`] when the path is not a regular plugin file or the
///   manifest fails to parse
/// - [`Error::Contract`] when the manifest does not export exactly one of
///   the two accepted handler shapes
/// - [`Error::RouteSetup`] when building the route set fails
pub fn load(path: &Path) -> Result<LoadedPlugin> {
    let Some(name) = plugin_name(path) else {
        return Err(Error::Import(format!(
            "{} is not a plugin file",
            path.display()
        )));
    };

    if !path.is_file() {
        return Err(Error::Import(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Import(format!("failed to read {}: {e}", path.display())))?;
    let manifest: PluginManifest = toml::from_str(&content)
        .map_err(|e| Error::Import(format!("failed to parse {}: {e}", path.display())))?;

    let mut info = manifest.plugin_info;
    if info.name.is_none() {
        info.name = Some(name.clone());
    }

    let (catch_all, bindings) = match (manifest.handler, manifest.routes) {
        (Some(spec), routes) if routes.is_empty() => {
            let handler = build_handler(&name, &spec)?;
            (Some(handler), Vec::new())
        }
        (None, routes) if !routes.is_empty() => (None, build_bindings(&name, &routes)?),
        (Some(_), _) => {
            return Err(Error::Contract(format!(
                "plugin {name} exports both a handler and routes; pick one"
            )));
        }
        (None, _) => {
            return Err(Error::Contract(format!(
                "plugin {name} exports no valid route handler"
            )));
        }
    };

    tracing::debug!(
        plugin = %name,
        version = %info.version,
        routes = bindings.len().max(usize::from(catch_all.is_some())),
        "loaded plugin"
    );

    Ok(LoadedPlugin {
        name,
        source_path: path.to_path_buf(),
        info,
        catch_all,
        bindings,
    })
}

/// Build the explicit route bindings for shape (b)
fn build_bindings(name: &str, routes: &[RouteSpec]) -> Result<Vec<RouteBinding>> {
    let mut bindings = Vec::with_capacity(routes.len());
    let mut seen: Vec<(String, Option<Method>)> = Vec::new();

    for route in routes {
        if !route.path.starts_with('/') {
            return Err(Error::RouteSetup(format!(
                "plugin {name}: route path {:?} must start with '/'",
                route.path
            )));
        }
        if route.path.chars().any(char::is_whitespace) {
            return Err(Error::RouteSetup(format!(
                "plugin {name}: route path {:?} contains whitespace",
                route.path
            )));
        }

        let method = route
            .method
            .as_deref()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                    Error::RouteSetup(format!("plugin {name}: invalid method {m:?}"))
                })
            })
            .transpose()?;

        let key = (route.path.to_ascii_lowercase(), method.clone());
        if seen.contains(&key) {
            return Err(Error::RouteSetup(format!(
                "plugin {name}: duplicate route {} {}",
                route.method.as_deref().unwrap_or("ANY"),
                route.path
            )));
        }
        seen.push(key);

        bindings.push(RouteBinding {
            path: route.path.clone(),
            method,
            handler: build_handler(name, &route.handler)?,
        });
    }

    Ok(bindings)
}

/// Validate a handler spec into its executable form
fn build_handler(name: &str, spec: &HandlerSpec) -> Result<Handler> {
    match spec {
        HandlerSpec::Static { status, body } => {
            let status = StatusCode::from_u16(*status).map_err(|_| {
                Error::RouteSetup(format!("plugin {name}: invalid status code {status}"))
            })?;
            Ok(Handler::Static {
                status,
                body: body.clone(),
            })
        }
        HandlerSpec::Echo => Ok(Handler::Echo),
        HandlerSpec::Proxy {
            upstream,
            forward_query,
        } => {
            let url = url::Url::parse(upstream).map_err(|e| {
                Error::RouteSetup(format!("plugin {name}: invalid upstream {upstream:?}: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::RouteSetup(format!(
                    "plugin {name}: upstream {upstream:?} must be http(s)"
                )));
            }
            Ok(Handler::Proxy {
                upstream: url,
                forward_query: *forward_query,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_plugin(dir: &Path, file: &str, contents: &str) -> PathBuf {
        let path = dir.join(file);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn plugin_name_from_path() {
        assert_eq!(plugin_name(Path::new("/p/echo.toml")).as_deref(), Some("echo"));
        assert_eq!(plugin_name(Path::new("/p/.hidden.toml")), None);
        assert_eq!(plugin_name(Path::new("/p/readme.md")), None);
        assert_eq!(plugin_name(Path::new("/p/noext")), None);
    }

    #[test]
    fn load_single_handler_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(
            dir.path(),
            "echo.toml",
            "[handler]\nkind = \"static\"\n[handler.body]\nok = true\n",
        );

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.name, "echo");
        assert!(loaded.catch_all.is_some());
        assert!(loaded.bindings.is_empty());
        assert_eq!(loaded.info.name.as_deref(), Some("echo"));
    }

    #[test]
    fn load_routes_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(
            dir.path(),
            "lookup.toml",
            r#"
            [[route]]
            path = "/"
            method = "get"
            handler = { kind = "echo" }

            [[route]]
            path = "/deep"
            handler = { kind = "static", body = { code = 200 } }
            "#,
        );

        let loaded = load(&path).unwrap();
        assert!(loaded.catch_all.is_none());
        assert_eq!(loaded.bindings.len(), 2);
        assert_eq!(loaded.bindings[0].method, Some(Method::GET));
    }

    #[test]
    fn parse_failure_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(dir.path(), "broken.toml", "this is { not toml");

        match load(&path) {
            Err(Error::Import(_)) => {}
            other => panic!("expected import error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_import_error() {
        match load(Path::new("/nonexistent/ghost.toml")) {
            Err(Error::Import(_)) => {}
            other => panic!("expected import error, got {other:?}"),
        }
    }

    #[test]
    fn no_shape_is_contract_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(
            dir.path(),
            "empty.toml",
            "[plugin_info]\nversion = \"1.0.0\"\n",
        );

        match load(&path) {
            Err(Error::Contract(_)) => {}
            other => panic!("expected contract error, got {other:?}"),
        }
    }

    #[test]
    fn both_shapes_is_contract_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(
            dir.path(),
            "both.toml",
            r#"
            [handler]
            kind = "echo"

            [[route]]
            path = "/x"
            handler = { kind = "echo" }
            "#,
        );

        match load(&path) {
            Err(Error::Contract(_)) => {}
            other => panic!("expected contract error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_route_is_route_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(
            dir.path(),
            "dup.toml",
            r#"
            [[route]]
            path = "/x"
            method = "GET"
            handler = { kind = "echo" }

            [[route]]
            path = "/X"
            method = "GET"
            handler = { kind = "echo" }
            "#,
        );

        match load(&path) {
            Err(Error::RouteSetup(_)) => {}
            other => panic!("expected route setup error, got {other:?}"),
        }
    }

    #[test]
    fn bad_upstream_is_route_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_plugin(
            dir.path(),
            "proxy.toml",
            "[handler]\nkind = \"proxy\"\nupstream = \"ftp://files.example.com\"\n",
        );

        match load(&path) {
            Err(Error::RouteSetup(_)) => {}
            other => panic!("expected route setup error, got {other:?}"),
        }
    }
}
