//! Daemon lifecycle
//!
//! Wires the pieces together: load the plugin directory into the registry,
//! start the filesystem watcher, serve HTTP, and unwind in reverse order on
//! shutdown. The watcher stops before the HTTP server drains, so no reload
//! can land while connections are being closed.

use std::sync::Arc;

use crate::Result;
use crate::api::{ApiServer, ApiState};
use crate::config::Config;
use crate::plugins::{ChangeSink, PluginRegistry, PluginWatcher};

/// The Portico daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the plugin directory is unreadable, the watcher
    /// cannot be established, or the HTTP server fails.
    pub async fn run(self) -> Result<()> {
        let registry = Arc::new(PluginRegistry::new());

        let loaded = registry.load_directory(&self.config.plugin_dir).await?;
        tracing::info!(
            count = loaded,
            path = %self.config.plugin_dir.display(),
            "plugin directory loaded"
        );

        let watcher = if self.config.watch.enabled {
            let sink: Arc<dyn ChangeSink> = registry.clone();
            Some(PluginWatcher::spawn(
                &self.config.plugin_dir,
                sink,
                self.config.watch.debounce,
            )?)
        } else {
            tracing::info!("filesystem watching disabled");
            None
        };

        let state = Arc::new(ApiState::new(
            registry,
            self.config.api_key.clone(),
            self.config.plugin_dir.clone(),
        ));
        let server = ApiServer::new(state, self.config.server.host.clone(), self.config.server.port);

        // Stop the watcher before draining HTTP, so no reload runs while
        // connections close
        let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested");
            if let Some(watcher) = watcher {
                watcher.shutdown().await;
            }
            let _ = drain_tx.send(());
        });

        server
            .run_until(async {
                let _ = drain_rx.await;
            })
            .await?;

        tracing::info!("shutdown complete");
        Ok(())
    }
}

/// Resolve on the first SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; park forever
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
