//! HTTP server implementation using axum.

use crate::error::ServerError;
use crate::server::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod handlers;

/// Create HTTP router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/load/{file}/{label}", post(handlers::handle_load))
        .route("/labels/{identifier}", get(handlers::handle_labels))
        .route("/health", get(handlers::handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start HTTP server.
///
/// # Errors
///
/// Returns `ServerError` if the server fails to bind or encounters a runtime error.
pub async fn start_server(bind_addr: SocketAddr, state: Arc<AppState>) -> Result<(), ServerError> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::HttpBindFailed {
            addr: bind_addr,
            source,
        })?;

    tracing::info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Shutdown(format!("HTTP server error: {e}")))?;

    Ok(())
}
