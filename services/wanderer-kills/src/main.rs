//! Process entry point (SPEC_FULL.md §10.1, §11 "Graceful shutdown"),
//! grounded in the teacher's `services/server/src/main.rs` shape: load
//! config, init tracing, bind the gateway, start the poller, and wait for
//! Ctrl-C/SIGTERM before draining.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wanderer_kills::config::load_config_from_path;

/// Ingestion-and-fanout service for EVE Online killmail events.
#[derive(Debug, Parser)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, env = "WANDERER_KILLS_CONFIG", default_value = "/etc/wanderer-kills/config.toml")]
    config: PathBuf,
}

/// Grace period for draining in-flight work on shutdown (spec §5 "Poller
/// shutdown ... drains the bounded task pool within a grace period").
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let args = Args::parse();
    let config = load_config_from_path(&args.config)?;
    info!(path = %args.config.display(), "config.loaded");

    let app = wanderer_kills::build(&config)?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    wanderer_kills::run(app, rx, SHUTDOWN_GRACE).await?;
    info!("wanderer-kills shut down gracefully");
    Ok(())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful
/// shutdown (teacher's `shutdown_signal()` pattern, `services/server/src/main.rs`).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
