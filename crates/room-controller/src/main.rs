//! Room Controller
//!
//! Hosts room actors that track media-room membership and drive the worker
//! fleet over RPC.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Build the shared HTTP RPC client
//! 4. Spawn the room manager
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Wait for shutdown signal, then drain rooms

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use room_controller::actors::{ActorMetrics, ManagerLimits, RoomManagerActorHandle};
use room_controller::config::Config;
use room_controller::observability::{health_router, init_metrics_recorder, HealthState};
use room_controller::rpc::{HttpRpcClient, RpcClient};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Per-room budget for removing publishers on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Controller");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        rc_id = %config.rc_id,
        rpc_gateway_url = %config.rpc_gateway_url,
        rpc_timeout_ms = config.rpc_timeout.as_millis(),
        health_bind_address = %config.health_bind_address,
        max_rooms = config.max_rooms,
        room_mailbox_size = config.room_mailbox_size,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new(config.rc_id.clone()));

    let rpc_client: Arc<dyn RpcClient> = Arc::new(HttpRpcClient::from_config(&config).map_err(|e| {
        error!(error = %e, "Failed to create RPC client");
        e
    })?);
    info!(gateway = %config.rpc_gateway_url, "RPC client initialized");

    let actor_metrics = ActorMetrics::new();
    let manager = RoomManagerActorHandle::new(
        config.rc_id.clone(),
        rpc_client,
        Arc::clone(&actor_metrics),
        ManagerLimits::from(&config),
    );
    info!("Room manager started");

    let shutdown_token = manager.child_token();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = health_router(Arc::clone(&health_state))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    health_state.set_ready();
    info!("Room Controller running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Stop advertising readiness before rooms start draining
    health_state.set_not_ready();

    match manager.get_status().await {
        Ok(status) => info!(
            rooms = status.room_count,
            publishers = status.publisher_count,
            subscribers = status.subscriber_count,
            "Draining rooms"
        ),
        Err(e) => warn!(error = %e, "Could not read manager status before shutdown"),
    }

    if let Err(e) = manager.shutdown(SHUTDOWN_DEADLINE).await {
        warn!(error = %e, "Room manager shutdown error");
    }

    // The manager stops answering once every room has drained
    let drained = tokio::time::timeout(SHUTDOWN_DEADLINE, async {
        while manager.get_status().await.is_ok() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Room manager did not stop within the shutdown deadline");
    }

    // Give RPC lanes time to flush queued removePublisher calls
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!(
        messages_processed = actor_metrics.messages_processed(),
        "Room Controller shutdown complete"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
