use crate::domain::event::PaymentEvent;
use crate::domain::payment::{AttemptStatus, PaymentRequest};
use crate::providers::{
    check_signed_payload, idempotency_key, ProviderAdapter, ProviderError, SessionResult, VerifyError,
};
use axum::http::HeaderMap;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "wallet-signature";

/// Redirect-based wallet gateway: session creation returns an approval URL
/// the shopper is sent to; capture results come back on the webhook channel.
pub struct WalletGateway {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub tolerance_secs: i64,
    pub client: reqwest::Client,
}

#[derive(Deserialize)]
struct WalletOrder {
    id: String,
    approve_url: String,
}

#[derive(Deserialize)]
struct WalletEvent {
    event_id: String,
    event_type: String,
    create_time: i64,
    resource: WalletResource,
}

#[derive(Deserialize)]
struct WalletResource {
    attempt_id: Uuid,
}

fn status_for(event_type: &str) -> Option<AttemptStatus> {
    match event_type {
        "PAYMENT.CAPTURE.PENDING" => Some(AttemptStatus::Pending),
        "PAYMENT.CAPTURE.COMPLETED" => Some(AttemptStatus::Succeeded),
        "PAYMENT.CAPTURE.DENIED" => Some(AttemptStatus::Failed),
        "PAYMENT.CAPTURE.REFUNDED" => Some(AttemptStatus::Refunded),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for WalletGateway {
    fn name(&self) -> &str {
        "wallet"
    }

    async fn create_session(&self, req: &PaymentRequest) -> Result<SessionResult, ProviderError> {
        let url = format!("{}/v2/checkout/orders", self.base_url);
        let body = json!({
            "intent": "CAPTURE",
            "reference_id": req.order_id,
            "amount": {
                "value_minor": req.amount_minor,
                "currency_code": req.currency,
            },
        });

        let resp = self
            .client
            .post(url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Request-Id", idempotency_key(&req.order_id, self.name()))
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let order: WalletOrder = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("bad order response: {e}")))?;

        Ok(SessionResult::RedirectUrl {
            session_id: order.id,
            redirect_url: order.approve_url,
        })
    }

    fn verify_callback(&self, raw_payload: &[u8], headers: &HeaderMap) -> Result<PaymentEvent, VerifyError> {
        check_signed_payload(
            &self.webhook_secret,
            SIGNATURE_HEADER,
            headers,
            raw_payload,
            self.tolerance_secs,
        )?;

        let event: WalletEvent = serde_json::from_slice(raw_payload)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        let new_status = status_for(&event.event_type).ok_or_else(|| {
            VerifyError::MalformedPayload(format!("unknown event type {}", event.event_type))
        })?;
        let occurred_at = Utc
            .timestamp_opt(event.create_time, 0)
            .single()
            .ok_or_else(|| VerifyError::MalformedPayload("bad create_time".to_string()))?;

        Ok(PaymentEvent {
            event_id: event.event_id,
            provider_name: self.name().to_string(),
            attempt_id: event.resource.attempt_id,
            new_status,
            occurred_at,
            raw: serde_json::from_slice(raw_payload).unwrap_or(serde_json::Value::Null),
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/status", self.base_url);
        match self
            .client
            .get(url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
