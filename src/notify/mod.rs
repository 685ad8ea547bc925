use serde::Serialize;
use uuid::Uuid;

pub mod http;
pub mod memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Order-fulfillment collaborator. Underpayment is routed here for manual
/// resolution rather than being treated as an error.
#[async_trait::async_trait]
pub trait FulfillmentNotifier: Send + Sync {
    async fn on_payment_succeeded(&self, order_id: &str, attempt_id: Uuid) -> anyhow::Result<()>;
    async fn on_payment_failed(&self, order_id: &str, reason: &str) -> anyhow::Result<()>;
    async fn on_payment_underpaid(
        &self,
        order_id: &str,
        payment_id: Uuid,
        received: f64,
        expected: f64,
    ) -> anyhow::Result<()>;
}

/// Alerting collaborator; delivery is best effort and never blocks payment
/// processing.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise_alert(&self, severity: Severity, message: &str, context: serde_json::Value);
}
