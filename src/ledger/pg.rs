use crate::domain::crypto::{CryptoAsset, CryptoPayment, CryptoStatus};
use crate::domain::event::EventOutcome;
use crate::domain::payment::{AttemptStatus, NewAttempt, PaymentAttempt};
use crate::ledger::{transitions, EventClaim, LedgerError, PaymentLedger};
use anyhow::Context;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgLedger {
    pub pool: PgPool,
}

fn attempt_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<PaymentAttempt> {
    let status: String = row.get("status");
    Ok(PaymentAttempt {
        attempt_id: row.get("attempt_id"),
        order_id: row.get("order_id"),
        provider_name: row.get("provider_name"),
        amount_minor: row.get("amount_minor"),
        currency: row.get("currency"),
        status: AttemptStatus::parse(&status).with_context(|| format!("bad status {status}"))?,
        retry_count: row.get("retry_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn crypto_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<CryptoPayment> {
    let asset: String = row.get("asset");
    let status: String = row.get("status");
    Ok(CryptoPayment {
        payment_id: row.get("payment_id"),
        attempt_id: row.get("attempt_id"),
        order_id: row.get("order_id"),
        asset: CryptoAsset::parse(&asset).with_context(|| format!("bad asset {asset}"))?,
        expected_amount: row.get("expected_amount"),
        exchange_rate: row.get("exchange_rate"),
        payment_address: row.get("payment_address"),
        confirmations: row.get("confirmations"),
        required_confirmations: row.get("required_confirmations"),
        received_amount: row.get("received_amount"),
        status: CryptoStatus::parse(&status).with_context(|| format!("bad status {status}"))?,
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

#[async_trait::async_trait]
impl PaymentLedger for PgLedger {
    async fn record_attempt(&self, new: NewAttempt) -> anyhow::Result<Uuid> {
        let attempt_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO payment_attempts (attempt_id, order_id, provider_name, amount_minor, currency, status, retry_count)
            VALUES ($1, $2, $3, $4, $5, 'created', $6)
            "#,
        )
        .bind(attempt_id)
        .bind(&new.order_id)
        .bind(&new.provider_name)
        .bind(new.amount_minor)
        .bind(&new.currency)
        .bind(new.retry_count)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            attempt_id = %attempt_id,
            order_id = %new.order_id,
            provider = %new.provider_name,
            retry_count = new.retry_count,
            "payment attempt recorded"
        );
        Ok(attempt_id)
    }

    async fn transition(
        &self,
        attempt_id: Uuid,
        new_status: AttemptStatus,
        evidence: &serde_json::Value,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        let row = sqlx::query("SELECT status FROM payment_attempts WHERE attempt_id = $1 FOR UPDATE")
            .bind(attempt_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or(LedgerError::AttemptNotFound(attempt_id))?;

        let current: String = row.get("status");
        let from = AttemptStatus::parse(&current)
            .ok_or_else(|| anyhow::anyhow!("bad stored status {current}"))?;

        if !transitions::is_valid(from, new_status) {
            return Err(LedgerError::InvalidTransition { from, to: new_status });
        }

        let update = sqlx::query(
            "UPDATE payment_attempts SET status = $2, updated_at = now() WHERE attempt_id = $1",
        )
        .bind(attempt_id)
        .bind(new_status.as_str())
        .execute(&mut *tx)
        .await;

        match update {
            Ok(_) => {}
            // the partial unique index is the no-double-charge backstop
            Err(sqlx::Error::Database(db)) if db.constraint() == Some("uniq_one_succeeded_per_order") => {
                let order_id: String =
                    sqlx::query("SELECT order_id FROM payment_attempts WHERE attempt_id = $1")
                        .bind(attempt_id)
                        .fetch_one(&self.pool)
                        .await
                        .map(|r| r.get("order_id"))
                        .unwrap_or_default();
                return Err(LedgerError::AlreadySucceeded(order_id));
            }
            Err(e) => return Err(LedgerError::Storage(e.into())),
        }

        tx.commit().await.map_err(anyhow::Error::from)?;

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
        let row = sqlx::query("SELECT * FROM payment_attempts WHERE attempt_id = $1")
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| attempt_from_row(&r)).transpose()
    }

    async fn attempts_for_order(&self, order_id: &str) -> anyhow::Result<Vec<PaymentAttempt>> {
        let rows = sqlx::query("SELECT * FROM payment_attempts WHERE order_id = $1 ORDER BY created_at ASC")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(attempt_from_row).collect()
    }

    async fn succeeded_count(&self, order_id: &str) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM payment_attempts WHERE order_id = $1 AND status = 'succeeded'",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    async fn claim_event(&self, provider_name: &str, event_id: &str) -> anyhow::Result<EventClaim> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO provider_events (provider_name, event_id)
            VALUES ($1, $2)
            ON CONFLICT (provider_name, event_id) DO NOTHING
            "#,
        )
        .bind(provider_name)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(EventClaim::FirstDelivery);
        }

        let row = sqlx::query(
            "SELECT outcome FROM provider_events WHERE provider_name = $1 AND event_id = $2",
        )
        .bind(provider_name)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        let outcome: Option<String> = row.get("outcome");
        Ok(EventClaim::Duplicate(outcome.as_deref().and_then(EventOutcome::parse)))
    }

    async fn finish_event(
        &self,
        provider_name: &str,
        event_id: &str,
        outcome: EventOutcome,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE provider_events SET processed_at = now(), outcome = $3
            WHERE provider_name = $1 AND event_id = $2
            "#,
        )
        .bind(provider_name)
        .bind(event_id)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_crypto_payment(&self, payment: CryptoPayment) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crypto_payments (
                payment_id, attempt_id, order_id, asset, expected_amount, exchange_rate, payment_address,
                confirmations, required_confirmations, received_amount, status, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.attempt_id)
        .bind(&payment.order_id)
        .bind(payment.asset.as_str())
        .bind(payment.expected_amount)
        .bind(payment.exchange_rate)
        .bind(&payment.payment_address)
        .bind(payment.confirmations)
        .bind(payment.required_confirmations)
        .bind(payment.received_amount)
        .bind(payment.status.as_str())
        .bind(payment.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_crypto_payment(&self, payment_id: Uuid) -> anyhow::Result<Option<CryptoPayment>> {
        let row = sqlx::query("SELECT * FROM crypto_payments WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| crypto_from_row(&r)).transpose()
    }

    async fn active_crypto_payments(&self) -> anyhow::Result<Vec<CryptoPayment>> {
        let rows = sqlx::query(
            "SELECT * FROM crypto_payments WHERE status IN ('awaiting', 'unconfirmed') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(crypto_from_row).collect()
    }

    async fn update_crypto_payment(&self, payment: &CryptoPayment) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE crypto_payments
            SET confirmations = $2, received_amount = $3, status = $4, updated_at = now()
            WHERE payment_id = $1
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.confirmations)
        .bind(payment.received_amount)
        .bind(payment.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
