mod http;

use clap::Parser;
use gateway_config::load_config;
use gateway_core::{Gateway, Registry, SessionManager, StreamHub};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-gateway")]
#[command(about = "Federated gateway that aggregates many MCP backend servers behind one namespaced endpoint", long_about = None)]
struct Cli {
    /// Path to the gateway's YAML configuration file
    #[arg(short, long, default_value = "gateway.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    info!(path = %cli.config.display(), backends = config.backends.len(), "configuration loaded");

    let registry = Arc::new(Registry::new());
    for backend in &config.backends {
        if !backend.enabled {
            info!(backend = %backend.id, "backend disabled in config, skipping registration");
            continue;
        }
        if let Err(e) = registry.register_server(backend).await {
            warn!(backend = %backend.id, error = %e, "failed to register backend");
        }
    }

    registry.start_health_checks(config.health_check_interval()).await;

    let sessions = SessionManager::new(config.session_timeout());
    sessions.start_sweep().await;

    let streams = Arc::new(StreamHub::new());
    let gateway = Arc::new(Gateway::new(registry.clone(), sessions.clone(), streams));

    let app = http::router(gateway);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    sessions.shutdown().await;
    info!("gateway shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
