use axum::Json;
use serde::Serialize;

/// Health probe payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health - Liveness probe for deploy checks and keepalive pings.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
