//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::reconcile as reconcile_api;
use super::tasks as tasks_api;
use super::types::HealthResponse;
use crate::config::Config;
use crate::store::{self, SharedStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Task/session store, scoped per owner on every call
    pub store: SharedStore,
}

/// Build the application router for the given state.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/api/health", get(health));

    let protected_routes = Router::new()
        .route("/api/debug-sessions", post(reconcile_api::debug_sessions))
        .route("/api/fix-sessions", post(reconcile_api::fix_sessions))
        .route("/api/reset-task", post(reconcile_api::reset_task))
        // Ordinary tracking flow
        .nest("/api/tasks", tasks_api::routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = store::create_tracker_store(config.store_type, config.data_dir.clone()).await?;
    tracing::info!(
        "Tracker store initialized ({}, persistent: {})",
        config.store_type.as_str(),
        store.is_persistent()
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
    });
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGTERM/SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
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

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        auth_required: state.config.auth.auth_required(state.config.dev_mode),
        store: state.config.store_type.as_str().to_string(),
    })
}
