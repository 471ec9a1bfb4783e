//! Health check route

use super::AppStateRef;
use axum::{Json, extract::State};
use sea_orm::ConnectionTrait;
use serde::Serialize;

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime_seconds: u64,
    /// Whether a trivial query succeeded
    pub database: bool,
}

/// GET /health - liveness plus a database ping
pub async fn health_check(State(state): AppStateRef) -> Json<HealthResponse> {
    let database = state.db.execute_unprepared("SELECT 1").await.is_ok();
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        database,
    })
}
