use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::json;

use crate::server::AppState;

/// Liveness probe.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ping`
///
/// Answers `{"status":"pong"}` as long as the process is up. Suitable for
/// load-balancer and container liveness checks.
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "pong" }))
}

/// Readiness probe.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/health`
///
/// Reports database reachability, connection pool usage, and the
/// scheduler's counters. Returns **503** when the database cannot be
/// reached so orchestrators stop routing to this instance; the pool and
/// scheduler numbers are informational either way.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let scheduler = state.scheduler.stats().await;
    let pool = state.db.stats();

    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "up",
                "pool": { "size": pool.size, "idle": pool.idle },
                "scheduler": scheduler,
            })),
        ),
        Err(e) => {
            tracing::warn!("❌ Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "database": "down",
                    "pool": { "size": pool.size, "idle": pool.idle },
                    "scheduler": scheduler,
                })),
            )
        }
    }
}
