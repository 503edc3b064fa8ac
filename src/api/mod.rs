//! HTTP API: question-to-SQL endpoints plus schema inspection and record entry.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use routes::{
    AddRecordRequest, AddRecordResponse, NlqRequest, NlqResponse, SchemaResponse,
    SqlOnlyResponse,
};
pub use state::AppState;

/// Builds the router with all routes, permissive CORS and request tracing.
pub fn router(state: AppState) -> Router {
    // Any origin may call the API; the frontend is served separately
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/nlq-to-sql", post(routes::nlq_to_sql))
        .route("/nlq", post(routes::nlq))
        .route("/api/schema", get(routes::schema))
        .route("/api/add-record", post(routes::add_record))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Binds `addr` and serves the API until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
