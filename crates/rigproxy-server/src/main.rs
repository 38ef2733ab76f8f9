//! rigproxy: stratum login-rewriting relay.
//!
//! Accepts mining rigs, rewrites their login line according to server
//! policy, and relays everything else to a single upstream pool.

mod config;
mod listener;
mod registry;
mod server;
mod session;
mod snapshot;

use clap::Parser;
use config::{Overrides, RelayConfig};
use server::RelayServer;
use std::path::PathBuf;
use tracing::{error, info};

/// rigproxy: stratum login-rewriting relay
#[derive(Parser, Debug)]
#[command(name = "rigproxy", version, about = "Stratum login-rewriting relay")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "rigproxy.toml")]
    config: String,

    /// Upstream pool as host:port (overrides [upstream])
    #[arg(long)]
    upstream: Option<String>,

    /// Rig report output path (overrides report.path)
    #[arg(long)]
    report_path: Option<String>,

    /// Rig report interval in seconds (overrides report.interval_secs)
    #[arg(long)]
    report_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting rigproxy");

    let overrides = Overrides {
        upstream: cli.upstream.clone(),
        report_path: cli.report_path.clone(),
        report_interval: cli.report_interval,
    };
    let config = match RelayConfig::load(&PathBuf::from(&cli.config), &overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        upstream = %config.upstream,
        listeners = config.listen.len(),
        bypass_wallet = config.policy.bypass_wallet,
        bypass_worker_id = config.policy.bypass_worker_id,
        "config loaded"
    );

    let server = RelayServer::new(config);
    let listeners = match server.bind().await {
        Ok(listeners) => listeners,
        Err(e) => {
            error!(error = %e, "failed to start listener");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = server.run(listeners) => {}
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    server.write_final_report().await;
    info!(rigs = server.registry().count().await, "rigproxy stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
