use crate::domain::crypto::CryptoPayment;
use crate::domain::event::EventOutcome;
use crate::domain::payment::{AttemptStatus, NewAttempt, PaymentAttempt};
use crate::ledger::{transitions, EventClaim, LedgerError, PaymentLedger};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct EventRecord {
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    outcome: Option<EventOutcome>,
}

#[derive(Default)]
struct Inner {
    attempts: HashMap<Uuid, PaymentAttempt>,
    events: HashMap<(String, String), EventRecord>,
    crypto: HashMap<Uuid, CryptoPayment>,
}

/// In-memory ledger with the same invariants as the Postgres one. A single
/// mutex over each check-and-set keeps the claims atomic.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PaymentLedger for MemoryLedger {
    async fn record_attempt(&self, new: NewAttempt) -> anyhow::Result<Uuid> {
        let attempt_id = Uuid::new_v4();
        let now = Utc::now();
        let attempt = PaymentAttempt {
            attempt_id,
            order_id: new.order_id,
            provider_name: new.provider_name,
            amount_minor: new.amount_minor,
            currency: new.currency,
            status: AttemptStatus::Created,
            retry_count: new.retry_count,
            created_at: now,
            updated_at: now,
        };

        tracing::info!(
            attempt_id = %attempt_id,
            order_id = %attempt.order_id,
            provider = %attempt.provider_name,
            retry_count = attempt.retry_count,
            "payment attempt recorded"
        );
        self.inner.lock().unwrap().attempts.insert(attempt_id, attempt);
        Ok(attempt_id)
    }

    async fn transition(
        &self,
        attempt_id: Uuid,
        new_status: AttemptStatus,
        evidence: &serde_json::Value,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().unwrap();

        let (order_id, from) = match inner.attempts.get(&attempt_id) {
            Some(a) => (a.order_id.clone(), a.status),
            None => return Err(LedgerError::AttemptNotFound(attempt_id)),
        };

        if !transitions::is_valid(from, new_status) {
            return Err(LedgerError::InvalidTransition { from, to: new_status });
        }

        if new_status == AttemptStatus::Succeeded
            && inner
                .attempts
                .values()
                .any(|a| a.order_id == order_id && a.status == AttemptStatus::Succeeded)
        {
            return Err(LedgerError::AlreadySucceeded(order_id));
        }

        let attempt = inner
            .attempts
            .get_mut(&attempt_id)
            .ok_or(LedgerError::AttemptNotFound(attempt_id))?;
        attempt.status = new_status;
        attempt.updated_at = Utc::now();

        tracing::info!(
            attempt_id = %attempt_id,
            from = from.as_str(),
            to = new_status.as_str(),
            evidence = %evidence,
            "attempt transitioned"
        );
        Ok(())
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> anyhow::Result<Option<PaymentAttempt>> {
        Ok(self.inner.lock().unwrap().attempts.get(&attempt_id).cloned())
    }

    async fn attempts_for_order(&self, order_id: &str) -> anyhow::Result<Vec<PaymentAttempt>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<PaymentAttempt> = inner
            .attempts
            .values()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn succeeded_count(&self, order_id: &str) -> anyhow::Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .attempts
            .values()
            .filter(|a| a.order_id == order_id && a.status == AttemptStatus::Succeeded)
            .count() as i64)
    }

    async fn claim_event(&self, provider_name: &str, event_id: &str) -> anyhow::Result<EventClaim> {
        let mut inner = self.inner.lock().unwrap();
        let key = (provider_name.to_string(), event_id.to_string());
        match inner.events.get(&key) {
            Some(existing) => {
                tracing::debug!(
                    provider = provider_name,
                    event_id,
                    received_at = %existing.received_at,
                    processed = existing.processed_at.is_some(),
                    "event already seen"
                );
                Ok(EventClaim::Duplicate(existing.outcome))
            }
            None => {
                inner.events.insert(
                    key,
                    EventRecord {
                        received_at: Utc::now(),
                        processed_at: None,
                        outcome: None,
                    },
                );
                Ok(EventClaim::FirstDelivery)
            }
        }
    }

    async fn finish_event(
        &self,
        provider_name: &str,
        event_id: &str,
        outcome: EventOutcome,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let key = (provider_name.to_string(), event_id.to_string());
        if let Some(record) = inner.events.get_mut(&key) {
            record.processed_at = Some(Utc::now());
            record.outcome = Some(outcome);
        }
        Ok(())
    }

    async fn insert_crypto_payment(&self, payment: CryptoPayment) -> anyhow::Result<()> {
        self.inner.lock().unwrap().crypto.insert(payment.payment_id, payment);
        Ok(())
    }

    async fn get_crypto_payment(&self, payment_id: Uuid) -> anyhow::Result<Option<CryptoPayment>> {
        Ok(self.inner.lock().unwrap().crypto.get(&payment_id).cloned())
    }

    async fn active_crypto_payments(&self) -> anyhow::Result<Vec<CryptoPayment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .crypto
            .values()
            .filter(|p| !p.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn update_crypto_payment(&self, payment: &CryptoPayment) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .crypto
            .insert(payment.payment_id, payment.clone());
        Ok(())
    }
}
