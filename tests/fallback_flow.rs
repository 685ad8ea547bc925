use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use payment_orchestrator::circuit::registry::{BreakerSettings, HealthRegistry};
use payment_orchestrator::domain::payment::{AttemptStatus, PaymentRequest};
use payment_orchestrator::fallback::coordinator::{ChargeError, FallbackCoordinator};
use payment_orchestrator::fallback::retry::RetryPolicy;
use payment_orchestrator::ledger::memory::MemoryLedger;
use payment_orchestrator::ledger::PaymentLedger;
use payment_orchestrator::notify::memory::RecordingAlerts;
use payment_orchestrator::notify::Severity;
use payment_orchestrator::providers::mock::{MockBehavior, MockProvider};
use payment_orchestrator::providers::registry::ProviderRegistry;
use payment_orchestrator::providers::ProviderAdapter;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

fn request(order_id: &str) -> PaymentRequest {
    PaymentRequest {
        order_id: order_id.to_string(),
        amount_minor: 2_499,
        currency: "USD".to_string(),
        items: vec![],
        customer_email: None,
    }
}

fn coordinator(
    providers: Vec<Arc<dyn ProviderAdapter>>,
    ledger: Arc<MemoryLedger>,
    alerts: Arc<RecordingAlerts>,
) -> FallbackCoordinator {
    FallbackCoordinator {
        registry: ProviderRegistry::new(providers),
        ledger,
        health: Arc::new(HealthRegistry::new(BreakerSettings {
            failure_threshold: 5,
            cooldown: chrono::Duration::minutes(5),
        })),
        alerts,
        retry: fast_retry(),
    }
}

#[tokio::test]
async fn transient_failures_are_retried_then_succeed() {
    let card = Arc::new(MockProvider::new("card", MockBehavior::TransientThenSucceed(2)));
    let ledger = Arc::new(MemoryLedger::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let coord = coordinator(vec![card.clone()], ledger.clone(), alerts.clone());

    let outcome = coord.charge(&request("ord_1"), None).await.unwrap();

    assert_eq!(outcome.provider_used, "card");
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(card.session_calls(), 3);

    let attempt = ledger.get_attempt(outcome.attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Pending);
    assert_eq!(attempt.retry_count, 2);
    assert!(alerts.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn permanent_error_fails_over_without_retrying() {
    let card = Arc::new(MockProvider::new("card", MockBehavior::AlwaysPermanent));
    let wallet = Arc::new(MockProvider::new("wallet", MockBehavior::AlwaysSucceed));
    let ledger = Arc::new(MemoryLedger::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let coord = coordinator(vec![card.clone(), wallet.clone()], ledger.clone(), alerts);

    let outcome = coord.charge(&request("ord_2"), None).await.unwrap();

    assert_eq!(outcome.provider_used, "wallet");
    assert_eq!(card.session_calls(), 1);
    assert_eq!(wallet.session_calls(), 1);
}

#[tokio::test]
async fn unhealthy_provider_is_skipped_without_a_session_call() {
    let card = Arc::new(MockProvider::new("card", MockBehavior::AlwaysSucceed));
    card.set_healthy(false);
    let wallet = Arc::new(MockProvider::new("wallet", MockBehavior::AlwaysSucceed));
    let ledger = Arc::new(MemoryLedger::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let coord = coordinator(vec![card.clone(), wallet.clone()], ledger, alerts);

    let outcome = coord.charge(&request("ord_3"), None).await.unwrap();

    assert_eq!(outcome.provider_used, "wallet");
    assert_eq!(card.session_calls(), 0);
    assert_eq!(card.health_calls(), 1);

    // the skipped health check still counts against the breaker
    let snapshot = coord.health.snapshot();
    let card_health = snapshot.iter().find(|h| h.provider_name == "card").unwrap();
    assert_eq!(card_health.consecutive_failures, 1);
}

#[tokio::test]
async fn repeated_failures_open_the_circuit_and_stop_calls() {
    let card = Arc::new(MockProvider::new("card", MockBehavior::AlwaysTransient));
    let wallet = Arc::new(MockProvider::new("wallet", MockBehavior::AlwaysSucceed));
    let ledger = Arc::new(MemoryLedger::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let coord = coordinator(vec![card.clone(), wallet.clone()], ledger, alerts);

    // five charges, each exhausting retries against card before failing over
    for i in 0..5 {
        let outcome = coord.charge(&request(&format!("ord_{i}")), None).await.unwrap();
        assert_eq!(outcome.provider_used, "wallet");
    }
    let calls_before = card.session_calls();
    assert_eq!(calls_before, 5 * 4); // initial call plus three retries per charge
    assert!(coord.health.is_open("card", Utc::now()));

    // with the circuit open, card is never invoked again
    let outcome = coord.charge(&request("ord_after"), None).await.unwrap();
    assert_eq!(outcome.provider_used, "wallet");
    assert_eq!(card.session_calls(), calls_before);
}

#[tokio::test]
async fn total_failure_raises_a_critical_alert() {
    let card = Arc::new(MockProvider::new("card", MockBehavior::AlwaysPermanent));
    let wallet = Arc::new(MockProvider::new("wallet", MockBehavior::AlwaysTransient));
    let ledger = Arc::new(MemoryLedger::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let coord = coordinator(vec![card, wallet], ledger.clone(), alerts.clone());

    let err = coord.charge(&request("ord_doomed"), None).await.unwrap_err();
    assert!(matches!(err, ChargeError::AllProvidersFailed));

    let raised = alerts.alerts.lock().unwrap();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].0, Severity::Critical);

    // nothing was charged, so nothing was recorded
    assert!(ledger.attempts_for_order("ord_doomed").await.unwrap().is_empty());
}

#[tokio::test]
async fn preferred_provider_is_tried_first() {
    let card = Arc::new(MockProvider::new("card", MockBehavior::AlwaysSucceed));
    let wallet = Arc::new(MockProvider::new("wallet", MockBehavior::AlwaysSucceed));
    let ledger = Arc::new(MemoryLedger::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let coord = coordinator(vec![card.clone(), wallet.clone()], ledger, alerts);

    let outcome = coord.charge(&request("ord_pref"), Some("wallet")).await.unwrap();

    assert_eq!(outcome.provider_used, "wallet");
    assert_eq!(card.session_calls(), 0);
}

#[tokio::test]
async fn unknown_preferred_provider_falls_back_to_priority_order() {
    let card = Arc::new(MockProvider::new("card", MockBehavior::AlwaysSucceed));
    let ledger = Arc::new(MemoryLedger::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let coord = coordinator(vec![card.clone()], ledger, alerts);

    let outcome = coord.charge(&request("ord_typo"), Some("bank_wire")).await.unwrap();
    assert_eq!(outcome.provider_used, "card");
}
