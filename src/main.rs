//! Security Gateway (standalone binary)
//!
//! A request-security gateway built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                 SECURITY GATEWAY                 │
//!                    │                                                  │
//!  Client Request    │  ┌─────────┐   ┌──────────────────────────────┐ │
//!  ──────────────────┼─▶│  http   │──▶│      security pipeline       │ │
//!                    │  │ server  │   │ ip → size → type → rate →    │ │
//!                    │  └─────────┘   │ delay → inject → sanitize →  │ │
//!                    │                │ upload → csrf → audit        │ │
//!                    │                └──────────────┬───────────────┘ │
//!                    │                               │                 │
//!                    │                               ▼                 │
//!  Client Response   │  ┌─────────┐          ┌──────────────┐         │
//!  ◀─────────────────┼──│response │◀─────────│ application  │         │
//!                    │  │ headers │          │   handlers   │         │
//!                    │  └─────────┘          └──────────────┘         │
//!                    │                                                 │
//!                    │  ┌───────────────────────────────────────────┐ │
//!                    │  │          Cross-Cutting Concerns           │ │
//!                    │  │ config · observability · admin · lifecycle│ │
//!                    │  └───────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────────┘
//! ```

use axum::{routing::any, Json, Router};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use security_gateway::config::watcher::ConfigWatcher;
use security_gateway::config::{self, GatewayConfig};
use security_gateway::http::GatewayServer;
use security_gateway::lifecycle::{self, Shutdown};
use security_gateway::observability;
use security_gateway::SanitizedRequest;

#[derive(Parser)]
#[command(name = "security-gateway")]
#[command(about = "HTTP request-security gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration before logging so the level applies from the start
    let config = match &cli.config {
        Some(path) => config::loader::load_config(path)?,
        None => GatewayConfig::default(),
    };

    observability::logging::init(&config.observability.log_level);
    tracing::info!("security-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limiting = config.rate_limit.enabled,
        csrf = config.csrf.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    // Config hot reload
    let (_watcher_guard, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let server = GatewayServer::new(config, demo_routes());

    tokio::select! {
        result = server.run(listener, config_updates, server_shutdown) => {
            result?;
        }
        _ = lifecycle::wait_for_signal() => {
            shutdown.trigger();
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Placeholder application: echoes the sanitized request back.
///
/// Real deployments pass their own router to `GatewayServer::new`.
fn demo_routes() -> Router {
    Router::new().route(
        "/{*path}",
        any(|request: axum::extract::Request| async move {
            let sanitized = request.extensions().get::<SanitizedRequest>().cloned();
            Json(serde_json::json!({
                "success": true,
                "body": sanitized.as_ref().and_then(|s| s.body.clone()),
                "query": sanitized.as_ref().map(|s| s.query.clone()),
            }))
        }),
    )
}
