use crate::domain::event::{EventOutcome, PaymentEvent};
use crate::domain::payment::AttemptStatus;
use crate::fallback::retry::{backoff_delay, RetryPolicy};
use crate::ledger::{apply_event_once, LedgerError, PaymentLedger};
use crate::notify::FulfillmentNotifier;
use crate::providers::registry::ProviderRegistry;
use axum::http::HeaderMap;
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq)]
pub enum IngestResult {
    /// Returned for deduplicated and business-rejected events too, so
    /// providers are never taught to retry on business outcomes.
    Accepted,
    Rejected { reason: &'static str },
}

/// Ingress for provider callbacks: verification through the matching
/// adapter, then exactly-once application through the ledger.
pub struct WebhookGateway {
    pub registry: ProviderRegistry,
    pub ledger: Arc<dyn PaymentLedger>,
    pub fulfillment: Arc<dyn FulfillmentNotifier>,
    pub handler_retry: RetryPolicy,
}

impl WebhookGateway {
    pub async fn ingest(
        &self,
        provider_name: &str,
        raw_payload: &[u8],
        headers: &HeaderMap,
    ) -> anyhow::Result<IngestResult> {
        let Some(provider) = self.registry.get(provider_name) else {
            tracing::warn!(provider = provider_name, "webhook for unknown provider");
            return Ok(IngestResult::Rejected { reason: "unknown_provider" });
        };

        let event = match provider.verify_callback(raw_payload, headers) {
            Ok(event) => event,
            Err(e) => {
                // security-relevant; logged without any payload or secret material
                tracing::warn!(
                    provider = provider_name,
                    reason = e.reason(),
                    "webhook verification failed"
                );
                return Ok(IngestResult::Rejected { reason: e.reason() });
            }
        };

        apply_event_once(self.ledger.as_ref(), provider_name, &event.event_id, || {
            self.process(&event)
        })
        .await?;

        Ok(IngestResult::Accepted)
    }

    /// The handler behind the idempotency boundary: ledger transition plus
    /// fulfillment notification, retried as one unit so a storage blip does
    /// not strand the event in its claimed-but-unapplied state. Verification
    /// is never retried.
    async fn process(&self, event: &PaymentEvent) -> EventOutcome {
        let max_attempts = 3;
        let mut transitioned = false;

        for attempt in 1..=max_attempts {
            match self.apply(event, &mut transitioned).await {
                Ok(outcome) => return outcome,
                Err(e) if attempt < max_attempts => {
                    let delay = backoff_delay(&self.handler_retry, attempt);
                    tracing::warn!(
                        attempt_id = %event.attempt_id,
                        attempt,
                        "event handler failed, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        attempt_id = %event.attempt_id,
                        "event handler exhausted retries: {e}"
                    );
                }
            }
        }

        EventOutcome::HandlerFailed
    }

    /// One handler attempt. `transitioned` survives across retries so a
    /// notification failure never re-runs an already-applied transition.
    /// Ok carries the recorded outcome; Err means try again.
    async fn apply(
        &self,
        event: &PaymentEvent,
        transitioned: &mut bool,
    ) -> anyhow::Result<EventOutcome> {
        if !*transitioned {
            match self
                .ledger
                .transition(event.attempt_id, event.new_status, &event.raw)
                .await
            {
                Ok(()) => *transitioned = true,
                Err(LedgerError::InvalidTransition { from, to }) if from == to => {
                    // providers resend the current state routinely; not a
                    // data-integrity problem
                    tracing::debug!(
                        attempt_id = %event.attempt_id,
                        status = from.as_str(),
                        "same-state event acknowledged as a no-op"
                    );
                    return Ok(EventOutcome::Applied);
                }
                Err(LedgerError::InvalidTransition { from, to }) => {
                    tracing::warn!(
                        attempt_id = %event.attempt_id,
                        from = from.as_str(),
                        to = to.as_str(),
                        "out-of-order event rejected by state machine, flagged for review"
                    );
                    return Ok(EventOutcome::InvalidTransition);
                }
                Err(LedgerError::AlreadySucceeded(order_id)) => {
                    tracing::warn!(
                        attempt_id = %event.attempt_id,
                        order_id = %order_id,
                        "success event for an order that already succeeded, flagged for review"
                    );
                    return Ok(EventOutcome::InvalidTransition);
                }
                Err(LedgerError::AttemptNotFound(attempt_id)) => {
                    tracing::warn!(attempt_id = %attempt_id, "event references unknown attempt");
                    return Ok(EventOutcome::InvalidTransition);
                }
                Err(LedgerError::Storage(e)) => return Err(e),
            }
        }

        match event.new_status {
            AttemptStatus::Succeeded | AttemptStatus::Failed => self.notify(event).await,
            _ => Ok(EventOutcome::Applied),
        }
    }

    async fn notify(&self, event: &PaymentEvent) -> anyhow::Result<EventOutcome> {
        let Some(attempt) = self.ledger.get_attempt(event.attempt_id).await? else {
            tracing::warn!(attempt_id = %event.attempt_id, "attempt vanished before notification");
            return Ok(EventOutcome::HandlerFailed);
        };

        match event.new_status {
            AttemptStatus::Succeeded => {
                self.fulfillment
                    .on_payment_succeeded(&attempt.order_id, event.attempt_id)
                    .await?
            }
            _ => {
                self.fulfillment
                    .on_payment_failed(&attempt.order_id, "provider reported failure")
                    .await?
            }
        }

        Ok(EventOutcome::Applied)
    }
}
