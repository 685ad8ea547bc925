use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn providers_health(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health.snapshot()))
}

/// Audit view of every attempt made for an order.
pub async fn list_attempts(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> impl IntoResponse {
    match state.ledger.attempts_for_order(&order_id).await {
        Ok(attempts) => (StatusCode::OK, Json(json!({ "attempts": attempts }))).into_response(),
        Err(e) => {
            tracing::error!(order_id = %order_id, "attempt listing failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "reason": "internal_error" })),
            )
                .into_response()
        }
    }
}
