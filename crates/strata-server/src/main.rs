//! Strata Server Binary
//!
//! Replica process for the Strata key-value store. Reads its identity, the
//! seeded view, and the optional shard count from the environment (or
//! flags), catches up with the cluster via anti-entropy sync, announces
//! itself, and serves the HTTP surface with the heartbeat failure detector
//! running alongside.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use clap::Parser;
use reqwest::Method;
use strata_common::NodeConfig;
use strata_server::{broadcast::Outbound, create_router, heartbeat, sync, AppState};
use tokio::signal;

#[derive(Parser)]
#[command(name = "strata-server")]
#[command(about = "Strata sharded, causally consistent key-value store")]
struct Args {
    /// Socket address to bind; doubles as this replica's identity
    #[arg(long, env = "SOCKET_ADDRESS")]
    socket_address: String,

    /// Comma-separated initial view, including this node
    #[arg(long, env = "VIEW", default_value = "")]
    view: String,

    /// Initial shard count; omit to run non-sharded
    #[arg(long, env = "SHARD_COUNT")]
    shard_count: Option<usize>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = match NodeConfig::new(args.socket_address, &args.view, args.shard_count) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting Strata replica {}", config.socket_address);
    let state = AppState::new(config.clone());

    // Catch up with the cluster (or initialize fresh state).
    sync::bootstrap(&state).await;
    if let Some(shard) = state.my_shard() {
        tracing::info!(shard = %shard, "replica assigned to shard");
    }

    // Announce ourselves so peers (re)admit us into their views.
    let announcement = serde_json::json!({ "socket-address": config.socket_address });
    state.broadcaster.broadcast(
        Outbound::new(Method::PUT, "view", announcement),
        &state.view.snapshot(),
    );

    tokio::spawn(heartbeat::run(state.clone()));

    let app = create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.socket_address)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Strata replica listening on http://{}", config.socket_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("Server error");
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining replication queues...");
    state.broadcaster.drain().await;
}
