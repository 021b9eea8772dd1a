//! # Server Module
//!
//! HTTP server setup and route configuration for the DCA engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::config::CONFIG;
use crate::database::connection::DatabaseConnection;
use crate::routes::health::{health, ping};
use crate::services::DcaScheduler;

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub scheduler: Arc<DcaScheduler>,
}

/// Starts the HTTP surface and serves it until the process exits.
///
/// The engine only exposes operational endpoints; every trading and
/// strategy operation runs through the scheduler, never over the wire.
pub async fn start(state: AppState) -> Result<()> {
    // Read-only GET surface, so any origin is fine and no credentials flow
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]);

    let app = Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state);

    let addr = std::net::SocketAddr::new(
        CONFIG
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid SERVER_HOST: {}", CONFIG.server.host))?,
        CONFIG.server.port,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr} - port may already be in use"))?;

    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health checks at http://{}/ping and http://{}/health", addr, addr);

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;
    Ok(())
}
