//! Idiogen compile server.
//!
//! Accepts a multipart upload of a grammar, lexer, interpreter, documentation
//! and example, runs them through bison, flex and emcc, and returns a zip
//! bundle with the compiled web module.
//!
//! # Architecture
//!
//! The server consists of:
//! - **Routes**: `/compile`, `/health` and the index banner
//! - **Upload**: streams multipart parts into the core intake
//! - **Delivery**: streams the bundle back and releases the workspace afterwards

pub mod delivery;
pub mod error;
pub mod routes;
pub mod upload;

use std::net::SocketAddr;
use std::sync::Arc;

use idiogen_core::{Pipeline, PipelineConfig};

pub use error::{ServerError, ServerResult};
pub use routes::{AppState, create_router};

/// Default cap on the multipart body (32 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 << 20;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Cap on the multipart body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9657,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Start the compile server.
pub async fn serve(config: ServerConfig, pipeline: PipelineConfig) -> ServerResult<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::Address(format!("{}:{}", config.host, config.port)))?;

    let report = pipeline.toolchain.report();
    if !report.is_complete() {
        tracing::warn!("toolchain incomplete, builds will fail: {:?}", report);
    }

    let state = Arc::new(AppState {
        pipeline: Pipeline::new(pipeline),
        max_body_bytes: config.max_body_bytes,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting Idiogen server at http://{}", addr);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    // Handle Ctrl+C for graceful shutdown
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
