use crate::domain::event::PaymentEvent;
use crate::domain::payment::{AttemptStatus, PaymentRequest};
use crate::providers::{check_signed_payload, ProviderAdapter, ProviderError, SessionResult, VerifyError};
use axum::http::HeaderMap;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "mock-signature";

#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    AlwaysSucceed,
    AlwaysTransient,
    AlwaysPermanent,
    /// Fail with a transient error this many times, then succeed.
    TransientThenSucceed(u32),
}

/// Scripted provider for exercising retry, fallback and webhook flows
/// without a remote service.
pub struct MockProvider {
    pub provider_name: String,
    pub behavior: MockBehavior,
    pub webhook_secret: String,
    pub tolerance_secs: i64,
    healthy: AtomicBool,
    session_calls: AtomicU32,
    health_calls: AtomicU32,
    failures_left: AtomicU32,
}

#[derive(Deserialize)]
struct MockEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    created: i64,
    data: MockEventData,
}

#[derive(Deserialize)]
struct MockEventData {
    attempt_id: Uuid,
}

impl MockProvider {
    pub fn new(provider_name: &str, behavior: MockBehavior) -> Self {
        let failures_left = match behavior {
            MockBehavior::TransientThenSucceed(n) => n,
            _ => 0,
        };
        Self {
            provider_name: provider_name.to_string(),
            behavior,
            webhook_secret: "whsec_mock".to_string(),
            tolerance_secs: 300,
            healthy: AtomicBool::new(true),
            session_calls: AtomicU32::new(0),
            health_calls: AtomicU32::new(0),
            failures_left: AtomicU32::new(failures_left),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn session_calls(&self) -> u32 {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn create_session(&self, req: &PaymentRequest) -> Result<SessionResult, ProviderError> {
        let call = self.session_calls.fetch_add(1, Ordering::SeqCst) + 1;

        match self.behavior {
            MockBehavior::AlwaysSucceed => {}
            MockBehavior::AlwaysTransient => {
                return Err(ProviderError::Transient("mock timeout".to_string()));
            }
            MockBehavior::AlwaysPermanent => {
                return Err(ProviderError::Permanent("mock decline".to_string()));
            }
            MockBehavior::TransientThenSucceed(_) => {
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    return Err(ProviderError::Transient("mock timeout".to_string()));
                }
            }
        }

        Ok(SessionResult::ClientSecret {
            session_id: format!("sess_{}_{}", req.order_id, call),
            client_secret: format!("cs_{}", Uuid::new_v4()),
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

        let event: MockEvent = serde_json::from_slice(raw_payload)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        let new_status = match event.kind.as_str() {
            "payment.pending" => AttemptStatus::Pending,
            "payment.succeeded" => AttemptStatus::Succeeded,
            "payment.failed" => AttemptStatus::Failed,
            "payment.refunded" => AttemptStatus::Refunded,
            other => return Err(VerifyError::MalformedPayload(format!("unknown event type {other}"))),
        };
        let occurred_at = Utc
            .timestamp_opt(event.created, 0)
            .single()
            .ok_or_else(|| VerifyError::MalformedPayload("bad created timestamp".to_string()))?;

        Ok(PaymentEvent {
            event_id: event.id,
            provider_name: self.provider_name.clone(),
            attempt_id: event.data.attempt_id,
            new_status,
            occurred_at,
            raw: serde_json::from_slice(raw_payload).unwrap_or(serde_json::Value::Null),
        })
    }

    async fn health_check(&self) -> bool {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }
}
