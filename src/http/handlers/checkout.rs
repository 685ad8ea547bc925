use crate::domain::payment::{ErrorEnvelope, OrderItem, PaymentRequest};
use crate::fallback::coordinator::ChargeError;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub customer_email: Option<String>,
    pub preferred_provider: Option<String>,
}

pub async fn checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> impl IntoResponse {
    if req.amount_minor <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorEnvelope::new("INVALID_AMOUNT", "amount_minor must be > 0")),
        )
            .into_response();
    }

    let payment_req = PaymentRequest {
        order_id: req.order_id,
        amount_minor: req.amount_minor,
        currency: req.currency,
        items: req.items,
        customer_email: req.customer_email,
    };

    match state
        .coordinator
        .charge(&payment_req, req.preferred_provider.as_deref())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "provider_used": outcome.provider_used,
                "attempt_id": outcome.attempt_id,
                "retry_count": outcome.retry_count,
                "session": outcome.session,
            })),
        )
            .into_response(),
        Err(ChargeError::AllProvidersFailed) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorEnvelope::new(
                "PAYMENT_UNAVAILABLE",
                "payment could not be processed, please retry later",
            )),
        )
            .into_response(),
        Err(ChargeError::Storage(e)) => {
            tracing::error!("checkout failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorEnvelope::new("INTERNAL_ERROR", "internal error")),
            )
                .into_response()
        }
    }
}
