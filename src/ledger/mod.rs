use crate::domain::crypto::CryptoPayment;
use crate::domain::event::EventOutcome;
use crate::domain::payment::{AttemptStatus, NewAttempt, PaymentAttempt};
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod pg;
pub mod transitions;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: AttemptStatus, to: AttemptStatus },
    #[error("order {0} already has a succeeded attempt")]
    AlreadySucceeded(String),
    #[error("attempt {0} not found")]
    AttemptNotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Result of the atomic first-sight check on `(provider_name, event_id)`.
#[derive(Debug, Clone)]
pub enum EventClaim {
    FirstDelivery,
    /// Outcome is `None` when the first delivery is still being processed
    /// by a concurrent handler.
    Duplicate(Option<EventOutcome>),
}

/// Authoritative store for payment attempts, processed provider events and
/// crypto payments. The single source of truth; conflicting writes are
/// serialized per key by the backing store.
#[async_trait::async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn record_attempt(&self, new: NewAttempt) -> anyhow::Result<Uuid>;

    /// Enforces the attempt state machine; the evidence value lands in the
    /// audit log alongside the transition.
    async fn transition(
        &self,
        attempt_id: Uuid,
        new_status: AttemptStatus,
        evidence: &serde_json::Value,
    ) -> Result<(), LedgerError>;

    async fn get_attempt(&self, attempt_id: Uuid) -> anyhow::Result<Option<PaymentAttempt>>;
    async fn attempts_for_order(&self, order_id: &str) -> anyhow::Result<Vec<PaymentAttempt>>;
    async fn succeeded_count(&self, order_id: &str) -> anyhow::Result<i64>;

    /// Atomic check-and-set on `(provider_name, event_id)`: one insert that
    /// either claims the event or loses to an earlier delivery. Never
    /// check-then-write as two steps.
    async fn claim_event(&self, provider_name: &str, event_id: &str) -> anyhow::Result<EventClaim>;
    async fn finish_event(
        &self,
        provider_name: &str,
        event_id: &str,
        outcome: EventOutcome,
    ) -> anyhow::Result<()>;

    async fn insert_crypto_payment(&self, payment: CryptoPayment) -> anyhow::Result<()>;
    async fn get_crypto_payment(&self, payment_id: Uuid) -> anyhow::Result<Option<CryptoPayment>>;
    /// Non-terminal payments, i.e. the active poll set.
    async fn active_crypto_payments(&self) -> anyhow::Result<Vec<CryptoPayment>>;
    async fn update_crypto_payment(&self, payment: &CryptoPayment) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub enum ApplyResult {
    /// First delivery: the handler ran and produced this outcome.
    Applied(EventOutcome),
    /// Redelivery: the handler did not run; this is the recorded outcome.
    Deduplicated(Option<EventOutcome>),
}

/// The idempotency boundary for the whole system: runs `handler` only if
/// `(provider_name, event_id)` has not been seen, otherwise returns the
/// previously recorded outcome. The event is marked seen even when the
/// handler fails, so a provider redelivery never re-runs side effects.
pub async fn apply_event_once<F, Fut>(
    ledger: &dyn PaymentLedger,
    provider_name: &str,
    event_id: &str,
    handler: F,
) -> anyhow::Result<ApplyResult>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = EventOutcome>,
{
    match ledger.claim_event(provider_name, event_id).await? {
        EventClaim::Duplicate(prev) => {
            tracing::info!(
                provider = provider_name,
                event_id,
                "duplicate provider event, returning recorded outcome"
            );
            Ok(ApplyResult::Deduplicated(prev))
        }
        EventClaim::FirstDelivery => {
            let outcome = handler().await;
            ledger.finish_event(provider_name, event_id, outcome).await?;
            tracing::info!(
                provider = provider_name,
                event_id,
                outcome = outcome.as_str(),
                "provider event processed"
            );
            Ok(ApplyResult::Applied(outcome))
        }
    }
}
