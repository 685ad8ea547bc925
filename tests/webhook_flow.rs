use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use payment_orchestrator::domain::crypto::CryptoPayment;
use payment_orchestrator::domain::event::EventOutcome;
use payment_orchestrator::domain::payment::{AttemptStatus, NewAttempt, PaymentAttempt};
use payment_orchestrator::fallback::retry::RetryPolicy;
use payment_orchestrator::ledger::memory::MemoryLedger;
use payment_orchestrator::ledger::{EventClaim, LedgerError, PaymentLedger};
use std::sync::Mutex;
use payment_orchestrator::notify::memory::RecordingFulfillment;
use payment_orchestrator::providers::mock::{MockBehavior, MockProvider, SIGNATURE_HEADER};
use payment_orchestrator::providers::registry::ProviderRegistry;
use payment_orchestrator::providers::signature;
use payment_orchestrator::providers::ProviderAdapter;
use payment_orchestrator::webhook::gateway::{IngestResult, WebhookGateway};
use serde_json::json;
use uuid::Uuid;

const SECRET: &str = "whsec_mock";

fn gateway(
    ledger: Arc<MemoryLedger>,
    fulfillment: Arc<RecordingFulfillment>,
) -> WebhookGateway {
    let mock: Arc<dyn ProviderAdapter> =
        Arc::new(MockProvider::new("card", MockBehavior::AlwaysSucceed));
    WebhookGateway {
        registry: ProviderRegistry::new(vec![mock]),
        ledger,
        fulfillment,
        handler_retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
    }
}

async fn pending_attempt(ledger: &dyn PaymentLedger, order_id: &str) -> Uuid {
    let id = ledger
        .record_attempt(NewAttempt {
            order_id: order_id.to_string(),
            provider_name: "card".to_string(),
            amount_minor: 3_000,
            currency: "USD".to_string(),
            retry_count: 0,
        })
        .await
        .unwrap();
    ledger
        .transition(id, AttemptStatus::Pending, &json!({}))
        .await
        .unwrap();
    id
}

fn event_payload(event_id: &str, kind: &str, attempt_id: Uuid, timestamp: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "type": kind,
        "created": timestamp,
        "data": { "attempt_id": attempt_id },
    }))
    .unwrap()
}

fn signed_headers(payload: &[u8], timestamp: i64) -> HeaderMap {
    let sig = signature::sign(SECRET, timestamp, payload);
    let mut headers = HeaderMap::new();
    headers.insert(
        SIGNATURE_HEADER,
        format!("t={timestamp},v1={sig}").parse().unwrap(),
    );
    headers
}

#[tokio::test]
async fn valid_success_event_settles_and_notifies() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment.clone());

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_ok").await;
    let ts = Utc::now().timestamp();
    let payload = event_payload("evt_ok", "payment.succeeded", attempt_id, ts);

    let result = gw.ingest("card", &payload, &signed_headers(&payload, ts)).await.unwrap();
    assert_eq!(result, IngestResult::Accepted);

    let attempt = ledger.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Succeeded);

    let notified = fulfillment.succeeded.lock().unwrap();
    assert_eq!(*notified, vec![("ord_ok".to_string(), attempt_id)]);
}

#[tokio::test]
async fn redelivered_event_is_accepted_but_not_reapplied() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment.clone());

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_dup").await;
    let ts = Utc::now().timestamp();
    let payload = event_payload("evt_dup", "payment.succeeded", attempt_id, ts);
    let headers = signed_headers(&payload, ts);

    assert_eq!(gw.ingest("card", &payload, &headers).await.unwrap(), IngestResult::Accepted);
    assert_eq!(gw.ingest("card", &payload, &headers).await.unwrap(), IngestResult::Accepted);

    assert_eq!(fulfillment.succeeded.lock().unwrap().len(), 1);
    assert_eq!(ledger.succeeded_count("ord_dup").await.unwrap(), 1);
}

#[tokio::test]
async fn stale_timestamp_is_rejected_before_any_write() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment.clone());

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_stale").await;
    let ts = Utc::now().timestamp() - 4_000;
    let payload = event_payload("evt_stale", "payment.succeeded", attempt_id, ts);

    let result = gw.ingest("card", &payload, &signed_headers(&payload, ts)).await.unwrap();
    assert_eq!(result, IngestResult::Rejected { reason: "stale_timestamp" });

    let attempt = ledger.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Pending);
    assert!(fulfillment.succeeded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tampered_payload_fails_signature_check() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment);

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_tamper").await;
    let ts = Utc::now().timestamp();
    let payload = event_payload("evt_tamper", "payment.succeeded", attempt_id, ts);
    let headers = signed_headers(&payload, ts);

    let tampered = event_payload("evt_tamper", "payment.refunded", attempt_id, ts);
    let result = gw.ingest("card", &tampered, &headers).await.unwrap();
    assert_eq!(result, IngestResult::Rejected { reason: "invalid_signature" });
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment);

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_nohdr").await;
    let payload = event_payload("evt_nohdr", "payment.succeeded", attempt_id, Utc::now().timestamp());

    let result = gw.ingest("card", &payload, &HeaderMap::new()).await.unwrap();
    assert_eq!(result, IngestResult::Rejected { reason: "missing_header" });
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger, fulfillment);

    let result = gw.ingest("bank_wire", b"{}", &HeaderMap::new()).await.unwrap();
    assert_eq!(result, IngestResult::Rejected { reason: "unknown_provider" });
}

#[tokio::test]
async fn out_of_order_event_is_accepted_without_state_change() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment.clone());

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_order").await;
    let ts = Utc::now().timestamp();

    // refund before success is invalid from pending
    let payload = event_payload("evt_refund_early", "payment.refunded", attempt_id, ts);
    let result = gw.ingest("card", &payload, &signed_headers(&payload, ts)).await.unwrap();
    assert_eq!(result, IngestResult::Accepted);

    let attempt = ledger.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Pending);
    assert!(fulfillment.succeeded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn notification_retries_then_gives_up_without_losing_the_event() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment.clone());

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_flaky").await;
    let ts = Utc::now().timestamp();
    let payload = event_payload("evt_flaky", "payment.succeeded", attempt_id, ts);
    let headers = signed_headers(&payload, ts);

    // all three notification attempts fail
    fulfillment.fail_next(3);
    assert_eq!(gw.ingest("card", &payload, &headers).await.unwrap(), IngestResult::Accepted);
    assert!(fulfillment.succeeded.lock().unwrap().is_empty());

    // the ledger transition still happened and the event stays seen,
    // so redelivery does not notify either
    let attempt = ledger.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Succeeded);
    assert_eq!(gw.ingest("card", &payload, &headers).await.unwrap(), IngestResult::Accepted);
    assert!(fulfillment.succeeded.lock().unwrap().is_empty());
}

/// Ledger wrapper that fails the next N `transition` calls with a storage
/// error before delegating to the in-memory ledger.
struct FlakyLedger {
    inner: MemoryLedger,
    transition_failures: Mutex<u32>,
}

impl FlakyLedger {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryLedger::new(),
            transition_failures: Mutex::new(failures),
        }
    }

    fn fail_next(&self, failures: u32) {
        *self.transition_failures.lock().unwrap() = failures;
    }
}

#[async_trait::async_trait]
impl PaymentLedger for FlakyLedger {
    async fn record_attempt(&self, new: NewAttempt) -> anyhow::Result<Uuid> {
        self.inner.record_attempt(new).await
    }

    async fn transition(
        &self,
        attempt_id: Uuid,
        new_status: AttemptStatus,
        evidence: &serde_json::Value,
    ) -> Result<(), LedgerError> {
        {
            let mut left = self.transition_failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(LedgerError::Storage(anyhow::anyhow!("injected storage failure")));
            }
        }
        self.inner.transition(attempt_id, new_status, evidence).await
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> anyhow::Result<Option<PaymentAttempt>> {
        self.inner.get_attempt(attempt_id).await
    }

    async fn attempts_for_order(&self, order_id: &str) -> anyhow::Result<Vec<PaymentAttempt>> {
        self.inner.attempts_for_order(order_id).await
    }

    async fn succeeded_count(&self, order_id: &str) -> anyhow::Result<i64> {
        self.inner.succeeded_count(order_id).await
    }

    async fn claim_event(&self, provider_name: &str, event_id: &str) -> anyhow::Result<EventClaim> {
        self.inner.claim_event(provider_name, event_id).await
    }

    async fn finish_event(
        &self,
        provider_name: &str,
        event_id: &str,
        outcome: EventOutcome,
    ) -> anyhow::Result<()> {
        self.inner.finish_event(provider_name, event_id, outcome).await
    }

    async fn insert_crypto_payment(&self, payment: CryptoPayment) -> anyhow::Result<()> {
        self.inner.insert_crypto_payment(payment).await
    }

    async fn get_crypto_payment(&self, payment_id: Uuid) -> anyhow::Result<Option<CryptoPayment>> {
        self.inner.get_crypto_payment(payment_id).await
    }

    async fn active_crypto_payments(&self) -> anyhow::Result<Vec<CryptoPayment>> {
        self.inner.active_crypto_payments().await
    }

    async fn update_crypto_payment(&self, payment: &CryptoPayment) -> anyhow::Result<()> {
        self.inner.update_crypto_payment(payment).await
    }
}

#[tokio::test]
async fn storage_blip_during_transition_is_retried() {
    let ledger = Arc::new(FlakyLedger::new(0));
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = WebhookGateway {
        registry: ProviderRegistry::new(vec![Arc::new(MockProvider::new(
            "card",
            MockBehavior::AlwaysSucceed,
        ))]),
        ledger: ledger.clone(),
        fulfillment: fulfillment.clone(),
        handler_retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
    };

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_blip").await;
    ledger.fail_next(1);
    let ts = Utc::now().timestamp();
    let payload = event_payload("evt_blip", "payment.succeeded", attempt_id, ts);

    let result = gw.ingest("card", &payload, &signed_headers(&payload, ts)).await.unwrap();
    assert_eq!(result, IngestResult::Accepted);

    // the failed first write was retried, so the transition still landed
    let attempt = ledger.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Succeeded);
    assert_eq!(fulfillment.succeeded.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn same_state_event_is_acknowledged_as_a_no_op() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment.clone());

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_noop").await;
    let ts = Utc::now().timestamp();

    // providers routinely resend the state the attempt is already in
    let payload = event_payload("evt_noop", "payment.pending", attempt_id, ts);
    let result = gw.ingest("card", &payload, &signed_headers(&payload, ts)).await.unwrap();
    assert_eq!(result, IngestResult::Accepted);

    let attempt = ledger.get_attempt(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Pending);

    // recorded as applied, not as a state-machine violation
    let claim = ledger.claim_event("card", "evt_noop").await.unwrap();
    assert!(matches!(claim, EventClaim::Duplicate(Some(EventOutcome::Applied))));
}

#[tokio::test]
async fn transient_notification_failure_is_retried_to_success() {
    let ledger = Arc::new(MemoryLedger::new());
    let fulfillment = Arc::new(RecordingFulfillment::new());
    let gw = gateway(ledger.clone(), fulfillment.clone());

    let attempt_id = pending_attempt(ledger.as_ref(), "ord_retry_notify").await;
    let ts = Utc::now().timestamp();
    let payload = event_payload("evt_retry_notify", "payment.succeeded", attempt_id, ts);

    fulfillment.fail_next(2);
    let result = gw.ingest("card", &payload, &signed_headers(&payload, ts)).await.unwrap();
    assert_eq!(result, IngestResult::Accepted);
    assert_eq!(fulfillment.succeeded.lock().unwrap().len(), 1);
}
