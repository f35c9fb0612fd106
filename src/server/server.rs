use anyhow::{Context, Result};
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    Router,
};
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::models::ApiError;
use crate::config::BridgeConfig;
use crate::outbox::OutboxDispatcher;
use crate::routing::TaskStoreResolver;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: TaskStoreResolver,
    pub dispatcher: OutboxDispatcher,
}

impl AppState {
    pub fn new(resolver: TaskStoreResolver) -> Self {
        let dispatcher = OutboxDispatcher::new(resolver.clone(), resolver.config().outbox.clone());
        Self {
            resolver,
            dispatcher,
        }
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    use super::routes;

    Router::new()
        .nest("/api", routes::api_routes())
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            code: "NOT_FOUND".to_string(),
            message: "Not found".to_string(),
            details: None,
        }),
    )
}

/// Run the HTTP server with the outbox worker and store-cache eviction in
/// the background, until Ctrl-C or SIGTERM.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let cache_ttl = config.cache_ttl;
    let poll_interval = config.outbox.poll_interval;
    let batch_size = config.outbox.batch_size;

    let resolver = TaskStoreResolver::connect(config)
        .await
        .context("Failed to open metadata store")?;
    let state = AppState::new(resolver.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = state
        .dispatcher
        .clone()
        .spawn_worker(poll_interval, batch_size, shutdown_rx.clone());
    let evictor = spawn_evictor(resolver.clone(), cache_ttl, shutdown_rx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("taskbridge listening on {}", addr);
    tracing::info!("Data directory: {}", resolver.config().data_dir.display());

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down background tasks");
    // Receivers may already be gone; nothing to do then
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "Outbox worker ended abnormally");
    }
    if let Err(e) = evictor.await {
        tracing::warn!(error = %e, "Cache evictor ended abnormally");
    }

    resolver.registry().close_all().await;
    resolver.meta().close().await;
    Ok(())
}

/// Close task-store handles that sat idle longer than `ttl`.
fn spawn_evictor(
    resolver: TaskStoreResolver,
    ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let period = (ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let closed = resolver.registry().evict_idle(ttl).await;
                    if closed > 0 {
                        tracing::debug!(closed, "Evicted idle task stores");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
