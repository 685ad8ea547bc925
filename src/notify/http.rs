use crate::notify::{AlertSink, FulfillmentNotifier, Severity};
use serde_json::json;
use uuid::Uuid;

/// Posts fulfillment notifications to the order service.
#[derive(Clone)]
pub struct HttpFulfillment {
    pub base_url: String,
    pub client: reqwest::Client,
}

#[async_trait::async_trait]
impl FulfillmentNotifier for HttpFulfillment {
    async fn on_payment_succeeded(&self, order_id: &str, attempt_id: Uuid) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/fulfillment/payment-succeeded", self.base_url))
            .json(&json!({ "order_id": order_id, "attempt_id": attempt_id }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn on_payment_failed(&self, order_id: &str, reason: &str) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/fulfillment/payment-failed", self.base_url))
            .json(&json!({ "order_id": order_id, "reason": reason }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn on_payment_underpaid(
        &self,
        order_id: &str,
        payment_id: Uuid,
        received: f64,
        expected: f64,
    ) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/fulfillment/payment-underpaid", self.base_url))
            .json(&json!({
                "order_id": order_id,
                "payment_id": payment_id,
                "received_amount": received,
                "expected_amount": expected,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Fire-and-forget alert delivery; failures are logged, not propagated.
#[derive(Clone)]
pub struct HttpAlerts {
    pub alert_url: String,
    pub client: reqwest::Client,
}

#[async_trait::async_trait]
impl AlertSink for HttpAlerts {
    async fn raise_alert(&self, severity: Severity, message: &str, context: serde_json::Value) {
        let body = json!({
            "severity": severity.as_str(),
            "message": message,
            "context": context,
            "timestamp": chrono::Utc::now(),
        });
        if let Err(e) = self.client.post(&self.alert_url).json(&body).send().await {
            tracing::error!(severity = severity.as_str(), "alert delivery failed: {e}");
        }
    }
}
