use crate::crypto::transitions::advance;
use crate::domain::crypto::CryptoStatus;
use crate::domain::payment::AttemptStatus;
use crate::ledger::{LedgerError, PaymentLedger};
use crate::notify::FulfillmentNotifier;
use crate::providers::crypto_ledger::CryptoLedger;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Shared poller over all non-terminal crypto payments. A payment leaves
/// the poll set once it reaches a terminal state.
pub struct ConfirmationTracker {
    pub ledger: Arc<dyn PaymentLedger>,
    pub adapter: Arc<CryptoLedger>,
    pub fulfillment: Arc<dyn FulfillmentNotifier>,
    pub poll_interval: Duration,
}

impl ConfirmationTracker {
    pub async fn run(self) {
        loop {
            if let Err(e) = self.tick().await {
                tracing::error!("confirmation tracker error: {e}");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn tick(&self) -> anyhow::Result<()> {
        for payment in self.ledger.active_crypto_payments().await? {
            let obs = match self.adapter.query_address(&payment.payment_address).await {
                Ok(obs) => obs,
                Err(e) => {
                    tracing::warn!(payment_id = %payment.payment_id, "ledger query failed: {e}");
                    continue;
                }
            };

            let updated = advance(&payment, &obs, Utc::now());
            let changed = updated.status != payment.status
                || updated.confirmations != payment.confirmations
                || updated.received_amount != payment.received_amount;
            if !changed {
                continue;
            }

            self.ledger.update_crypto_payment(&updated).await?;

            if updated.status == payment.status {
                continue;
            }

            match updated.status {
                CryptoStatus::Confirmed => {
                    self.settle_attempt(&updated, AttemptStatus::Succeeded).await;
                    if let Err(e) = self
                        .fulfillment
                        .on_payment_succeeded(&updated.order_id, updated.attempt_id)
                        .await
                    {
                        tracing::error!(order_id = %updated.order_id, "fulfillment notification failed: {e}");
                    }
                }
                CryptoStatus::Underpaid => {
                    tracing::warn!(
                        payment_id = %updated.payment_id,
                        received = updated.received_amount,
                        expected = updated.expected_amount,
                        "crypto payment underpaid, routed for manual resolution"
                    );
                    if let Err(e) = self
                        .fulfillment
                        .on_payment_underpaid(
                            &updated.order_id,
                            updated.payment_id,
                            updated.received_amount,
                            updated.expected_amount,
                        )
                        .await
                    {
                        tracing::error!(order_id = %updated.order_id, "underpaid notification failed: {e}");
                    }
                }
                CryptoStatus::Expired => {
                    self.settle_attempt(&updated, AttemptStatus::Failed).await;
                    if let Err(e) = self
                        .fulfillment
                        .on_payment_failed(&updated.order_id, "crypto payment expired")
                        .await
                    {
                        tracing::error!(order_id = %updated.order_id, "expiry notification failed: {e}");
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn settle_attempt(&self, payment: &crate::domain::crypto::CryptoPayment, status: AttemptStatus) {
        let evidence = json!({
            "source": "confirmation_tracker",
            "payment_id": payment.payment_id,
            "confirmations": payment.confirmations,
            "received_amount": payment.received_amount,
        });
        match self.ledger.transition(payment.attempt_id, status, &evidence).await {
            Ok(()) => {}
            Err(LedgerError::InvalidTransition { from, to }) => {
                tracing::warn!(
                    attempt_id = %payment.attempt_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "attempt already settled elsewhere"
                );
            }
            Err(e) => {
                tracing::error!(attempt_id = %payment.attempt_id, "attempt settlement failed: {e}");
            }
        }
    }
}
