//! HTTP status surface for inspecting pending operations.
//!
//! - `GET /health` - liveness and crate version
//! - `GET /operations` - every pending operation plus the conflict counter
//! - `GET /operations/{collection}` - pending operations of one collection

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use optimist_engine::Operation;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::SyncContext;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Ledger overview.
#[derive(Debug, Serialize)]
pub struct OperationsResponse {
    /// Pending operations, oldest first
    pub pending: Vec<Operation>,
    /// Conflicts detected since startup
    pub conflict_count: u64,
    /// Operations held, settled or not
    pub total: usize,
}

/// Create the status router.
pub fn router(ctx: Arc<SyncContext>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/operations", get(operations))
        .route("/operations/{collection}", get(collection_operations))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx)
}

/// Serve the status router on `addr` until the task is cancelled.
pub async fn serve(ctx: Arc<SyncContext>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Status surface listening on {}", listener.local_addr()?);
    axum::serve(listener, router(ctx)).await
}

/// Health check handler.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /operations
async fn operations(State(ctx): State<Arc<SyncContext>>) -> Json<OperationsResponse> {
    let all = ctx.ledger().all();
    let total = all.len();
    Json(OperationsResponse {
        pending: all.into_iter().filter(Operation::is_pending).collect(),
        conflict_count: ctx.conflict_count(),
        total,
    })
}

/// GET /operations/{collection}
async fn collection_operations(
    State(ctx): State<Arc<SyncContext>>,
    Path(collection): Path<String>,
) -> Json<Vec<Operation>> {
    Json(ctx.ledger().pending_for(&collection))
}
