use crate::circuit::registry::HealthRegistry;
use crate::domain::crypto::{CryptoPayment, CryptoStatus};
use crate::domain::payment::{AttemptStatus, NewAttempt, PaymentRequest};
use crate::fallback::retry::{retry_transient, RetryOutcome, RetryPolicy};
use crate::ledger::PaymentLedger;
use crate::notify::{AlertSink, Severity};
use crate::providers::registry::ProviderRegistry;
use crate::providers::{ProviderAdapter, SessionResult};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChargeError {
    /// Surfaced to the caller as a generic retryable failure; provider
    /// identities stay internal.
    #[error("all payment providers failed")]
    AllProvidersFailed,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct ChargeOutcome {
    pub provider_used: String,
    pub attempt_id: Uuid,
    pub retry_count: u32,
    pub session: SessionResult,
}

/// Orchestrates one checkout across providers in priority order: health
/// check, bounded retries on transient errors, breaker bookkeeping, then
/// fail-fast to the next candidate. Never waits out a single provider's
/// outage.
pub struct FallbackCoordinator {
    pub registry: ProviderRegistry,
    pub ledger: Arc<dyn PaymentLedger>,
    pub health: Arc<HealthRegistry>,
    pub alerts: Arc<dyn AlertSink>,
    pub retry: RetryPolicy,
}

impl FallbackCoordinator {
    pub async fn charge(
        &self,
        req: &PaymentRequest,
        preferred: Option<&str>,
    ) -> Result<ChargeOutcome, ChargeError> {
        let mut candidates: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
        if let Some(name) = preferred {
            if let Some(provider) = self.registry.get(name) {
                candidates.push(provider);
            }
        }
        for provider in self.registry.in_priority_order() {
            if candidates.iter().all(|c| c.name() != provider.name()) {
                candidates.push(provider.clone());
            }
        }

        for provider in candidates {
            let name = provider.name().to_string();

            if self.health.is_open(&name, Utc::now()) {
                tracing::debug!(provider = %name, "circuit open, skipping");
                continue;
            }

            if !provider.health_check().await {
                tracing::warn!(provider = %name, "health check failed, skipping");
                self.health.on_failure(&name, Utc::now());
                continue;
            }

            let RetryOutcome { result, retries } =
                retry_transient(&self.retry, || provider.create_session(req)).await;

            match result {
                Ok(session) => {
                    self.health.on_success(&name);
                    let attempt_id = self
                        .ledger
                        .record_attempt(NewAttempt {
                            order_id: req.order_id.clone(),
                            provider_name: name.clone(),
                            amount_minor: req.amount_minor,
                            currency: req.currency.clone(),
                            retry_count: retries as i32,
                        })
                        .await?;

                    // session exists, outcome now belongs to the webhook channel
                    self.ledger
                        .transition(
                            attempt_id,
                            AttemptStatus::Pending,
                            &json!({ "stage": "session_created", "provider": name }),
                        )
                        .await
                        .map_err(|e| ChargeError::Storage(e.into()))?;

                    if let SessionResult::PaymentAddress {
                        payment_id,
                        payment_address,
                        asset,
                        crypto_amount,
                        exchange_rate,
                        expires_at,
                        ..
                    } = &session
                    {
                        self.ledger
                            .insert_crypto_payment(CryptoPayment {
                                payment_id: *payment_id,
                                attempt_id,
                                order_id: req.order_id.clone(),
                                asset: *asset,
                                expected_amount: *crypto_amount,
                                exchange_rate: *exchange_rate,
                                payment_address: payment_address.clone(),
                                confirmations: 0,
                                required_confirmations: asset.required_confirmations(),
                                received_amount: 0.0,
                                status: CryptoStatus::Awaiting,
                                expires_at: *expires_at,
                                created_at: Utc::now(),
                            })
                            .await?;
                    }

                    return Ok(ChargeOutcome {
                        provider_used: name,
                        attempt_id,
                        retry_count: retries,
                        session,
                    });
                }
                Err(e) => {
                    tracing::warn!(provider = %name, retries, "provider failed: {e}");
                    self.health.on_failure(&name, Utc::now());
                }
            }
        }

        self.alerts
            .raise_alert(
                Severity::Critical,
                "all payment providers failed",
                json!({ "order_id": req.order_id, "amount_minor": req.amount_minor }),
            )
            .await;
        Err(ChargeError::AllProvidersFailed)
    }
}
