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

pub const SIGNATURE_HEADER: &str = "card-signature";

/// Card/wallet gateway speaking a Stripe-style sessions API. The charge
/// completes client-side against the returned client secret; the outcome
/// arrives later on the webhook channel.
pub struct CardGateway {
    pub base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub tolerance_secs: i64,
    pub client: reqwest::Client,
}

#[derive(Deserialize)]
struct SessionBody {
    id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct CardEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    created: i64,
    data: CardEventData,
}

#[derive(Deserialize)]
struct CardEventData {
    attempt_id: Uuid,
}

fn status_for(kind: &str) -> Option<AttemptStatus> {
    match kind {
        "payment.pending" => Some(AttemptStatus::Pending),
        "payment.succeeded" => Some(AttemptStatus::Succeeded),
        "payment.failed" => Some(AttemptStatus::Failed),
        "payment.refunded" => Some(AttemptStatus::Refunded),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for CardGateway {
    fn name(&self) -> &str {
        "card"
    }

    async fn create_session(&self, req: &PaymentRequest) -> Result<SessionResult, ProviderError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let body = json!({
            "amount": req.amount_minor,
            "currency": req.currency,
            "reference": req.order_id,
            "customer_email": req.customer_email,
            "capture": "automatic",
        });

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key(&req.order_id, self.name()))
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

        let session: SessionBody = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("bad session response: {e}")))?;

        Ok(SessionResult::ClientSecret {
            session_id: session.id,
            client_secret: session.client_secret,
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

        let event: CardEvent = serde_json::from_slice(raw_payload)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        let new_status = status_for(&event.kind)
            .ok_or_else(|| VerifyError::MalformedPayload(format!("unknown event type {}", event.kind)))?;
        let occurred_at = Utc
            .timestamp_opt(event.created, 0)
            .single()
            .ok_or_else(|| VerifyError::MalformedPayload("bad created timestamp".to_string()))?;

        Ok(PaymentEvent {
            event_id: event.id,
            provider_name: self.name().to_string(),
            attempt_id: event.data.attempt_id,
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
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
