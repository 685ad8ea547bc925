use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

pub async fn get_status(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.ledger.get_crypto_payment(payment_id).await {
        Ok(Some(payment)) => (
            StatusCode::OK,
            Json(json!({
                "payment_id": payment.payment_id,
                "status": payment.status,
                "confirmations": payment.confirmations,
                "required_confirmations": payment.required_confirmations,
                "expires_at": payment.expires_at,
                "explorer_url": payment.asset.explorer_url(),
            })),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "reason": "payment_not_found" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(payment_id = %payment_id, "crypto status lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "reason": "internal_error" })),
            )
                .into_response()
        }
    }
}
