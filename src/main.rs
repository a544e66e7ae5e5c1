use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use retroweb_gate::config::GateConfig;
use retroweb_gate::http::{HttpServer, RateLimitState};
use retroweb_gate::ratelimit::{spawn_sweeper, PolicySet, RateLimiter};

/// Request admission and rate limiting for the RetroWeb builder API.
#[derive(Parser, Debug)]
#[command(name = "retroweb-gate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting RetroWeb gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GateConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let rules = match &config.rate_limiting.policies_path {
        Some(path) => PolicySet::from_file(path)?,
        None => {
            info!("No policies file configured, using built-in policies");
            PolicySet::default()
        }
    };
    info!(policies = rules.len(), default_policy = %rules.default_policy(), "Policies loaded");

    let rate_limiter = Arc::new(RateLimiter::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        rate_limiter.clone(),
        config.rate_limiting.sweep_interval(),
        wait_for(shutdown_rx.clone()),
    );

    if config.rate_limiting.trusted_proxies.is_empty() {
        info!("No trusted proxies configured, keying clients on peer address");
    } else {
        info!(
            trusted_proxies = ?config.rate_limiting.trusted_proxies,
            "Honouring forwarding headers from trusted proxies"
        );
    }
    let state = RateLimitState::new(rate_limiter, rules)
        .with_trusted_proxies(config.rate_limiting.trusted_proxies.clone());

    let server = HttpServer::new(config.server.listen_addr, state);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    server.serve_with_shutdown(wait_for(shutdown_rx)).await?;
    sweeper.await?;

    info!("RetroWeb gate stopped");
    Ok(())
}

/// Resolve once the shutdown flag flips.
async fn wait_for(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
