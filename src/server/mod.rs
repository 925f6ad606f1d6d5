//! HTTP API
//!
//! - `GET /`: service identity
//! - `GET /health`: liveness
//! - `POST /compile`: `CompileRequest` body in, `CompileResult` JSON out
//!
//! The compiler never fails a request; every outcome, failures included, is
//! a 200 with a `CompileResult` body. Only bodies that do not parse as a
//! request are rejected, by axum's `Json` extractor.

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::compiler::{CompileRequest, CompileResult, CompilerWrapper};
use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};

const IDENTITY: &str = "Near Compiler API Server";

#[derive(Clone)]
struct AppState {
    compiler: Arc<CompilerWrapper>,
}

async fn identity() -> &'static str {
    IDENTITY
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn compile(
    State(state): State<AppState>,
    Json(request): Json<CompileRequest>,
) -> Json<CompileResult> {
    Json(state.compiler.compile(request).await)
}

/// Build the API router around a shared compiler
pub fn build_router(compiler: Arc<CompilerWrapper>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(identity))
        .route("/health", get(health_check))
        .route("/compile", post(compile))
        .with_state(AppState { compiler })
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
}

/// Initialize the build root, then serve until Ctrl-C
pub async fn serve(config: Config) -> Result<()> {
    let compiler = Arc::new(CompilerWrapper::from_config(&config));

    info!(
        "Initializing build environment ({} runner)...",
        compiler.runner_name()
    );
    compiler.init().await?;

    let app = build_router(compiler, &config.server);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server is running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
