//! Error types for the Portico gateway

use thiserror::Error;

/// Result type alias for Portico operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Portico gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Plugin file could not be read or evaluated
    #[error("import error: {0}")]
    Import(String),

    /// Plugin file does not export a recognized handler shape
    #[error("contract error: {0}")]
    Contract(String),

    /// Building the plugin's route set failed
    #[error("route setup error: {0}")]
    RouteSetup(String),

    /// Plugin not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem watcher error (best-effort, logged only)
    #[error("watcher error: {0}")]
    Watcher(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is a plugin load-time error.
    ///
    /// Load-time errors are non-fatal: they are logged, recorded in the
    /// registry's failure log, and never replace previously installed routes.
    #[must_use]
    pub const fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::Import(_) | Self::Contract(_) | Self::RouteSetup(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_classification() {
        assert!(Error::Import("bad".into()).is_load_error());
        assert!(Error::Contract("bad".into()).is_load_error());
        assert!(Error::RouteSetup("bad".into()).is_load_error());
        assert!(!Error::NotFound("x".into()).is_load_error());
        assert!(!Error::Config("x".into()).is_load_error());
    }
}
