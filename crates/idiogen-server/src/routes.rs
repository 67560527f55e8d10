//! HTTP routes for the Idiogen server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use idiogen_core::{Intake, Pipeline};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::delivery;
use crate::error::{ServerError, ServerResult};
use crate::upload;

/// Application state shared across handlers.
pub struct AppState {
    /// Build pipeline (holds only configuration).
    pub pipeline: Pipeline,
    /// Cap on the whole multipart body, in bytes.
    pub max_body_bytes: usize,
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/compile", post(compile_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Index banner.
async fn index_handler() -> &'static str {
    "Hello world!\n"
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let toolchain = state.pipeline.config().toolchain.report();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "toolchain": toolchain,
    }))
}

/// Compile the uploaded language implementation and return the bundle.
async fn compile_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServerResult<Response> {
    check_content_length(&headers, state.max_body_bytes)?;

    let workspace = state.pipeline.acquire_workspace()?;
    tracing::info!(workspace = %workspace.id(), "compile request accepted");

    let inputs = {
        let mut intake = Intake::new(&workspace);
        upload::store_multipart(&mut multipart, &mut intake).await?;
        intake.finish()?
    };

    let bundle = state.pipeline.build(&workspace, inputs).await?;
    delivery::deliver(&bundle, workspace).await
}

/// Reject a declared body size over the cap before anything touches disk.
fn check_content_length(headers: &HeaderMap, limit: usize) -> ServerResult<()> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(actual) if actual > limit as u64 => Err(ServerError::PayloadTooLarge { actual, limit }),
        _ => Ok(()),
    }
}
