use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use portico::{Config, Daemon};

/// Portico - HTTP server with hot-loaded plugins
#[derive(Parser)]
#[command(name = "portico", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORTICO_PORT")]
    port: Option<u16>,

    /// Directory holding plugin manifests
    #[arg(long, env = "PORTICO_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,

    /// Disable filesystem watching (plugins load only at startup)
    #[arg(long)]
    no_watch: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate plugin manifests without serving
    Check {
        /// Plugin file or directory (defaults to the plugin directory)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,portico=info",
        1 => "info,portico=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.plugin_dir {
        config.plugin_dir = dir;
    }
    if cli.no_watch {
        config.watch.enabled = false;
    }

    if let Some(Command::Check { path }) = cli.command {
        return check(path.unwrap_or(config.plugin_dir));
    }

    tracing::info!(
        port = config.server.port,
        plugin_dir = %config.plugin_dir.display(),
        watch = config.watch.enabled,
        "starting portico"
    );

    Daemon::new(config).run().await?;

    Ok(())
}

/// Validate one manifest or every manifest in a directory
fn check(path: PathBuf) -> anyhow::Result<()> {
    let targets: Vec<PathBuf> = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&path)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| portico::plugins::plugin_name(p).is_some())
            .collect();
        files.sort();
        files
    } else {
        vec![path]
    };

    if targets.is_empty() {
        println!("no plugin manifests found");
        return Ok(());
    }

    let mut failed = 0;
    for target in &targets {
        match portico::plugins::load(target) {
            Ok(plugin) => {
                println!("ok   {} ({})", target.display(), plugin.name);
            }
            Err(e) => {
                println!("FAIL {}: {e}", target.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} manifests failed validation", targets.len());
    }
    Ok(())
}
