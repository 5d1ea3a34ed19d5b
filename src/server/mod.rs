//! HTTP surface: routes, key/session authentication and JSON handlers.

mod handlers;
mod middleware;
mod state;

pub use middleware::{SessionUser, API_KEY_HEADER};
pub use state::AppState;

use crate::error::{GatewayError, GatewayResult};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn build_router(state: AppState) -> Router {
    // Endpoints governed by the X-API-Key policy
    let engine_routes = Router::new()
        .route("/languages", get(handlers::languages))
        .route("/packages", get(handlers::packages))
        .route("/translate", post(handlers::translate))
        .route("/detect", post(handlers::detect))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_auth,
        ));

    let account_routes = Router::new()
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", get(handlers::me))
        .route("/api/usage", get(handlers::usage))
        .route("/api/user/upgrade", post(handlers::upgrade));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(engine_routes)
        .merge(account_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run store, lock and password-hashing work on the blocking pool so a slow
/// disk write or an Argon2 round never stalls an async worker.
pub(crate) async fn run_blocking<T, F>(work: F) -> GatewayResult<T>
where
    F: FnOnce() -> GatewayResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| GatewayError::Internal(format!("blocking task failed: {}", e)))?
}

/// Serve until the listener fails or the process receives Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Translation gateway listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")
}
