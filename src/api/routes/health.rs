use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::api::server::ApiState;

/// GET /api/health
///
/// Liveness plus ledger transaction counts by status. A failing ledger read
/// reports `degraded` with 503.
pub async fn handle_health(State(state): State<ApiState>) -> impl IntoResponse {
    match state.processor.count_by_status().await {
        Ok(counts) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "service": "depositd",
                "version": env!("CARGO_PKG_VERSION"),
                "transactions": counts
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "service": "depositd",
                "version": env!("CARGO_PKG_VERSION"),
                "error": e.to_string()
            })),
        ),
    }
}
