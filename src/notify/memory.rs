use crate::notify::{AlertSink, FulfillmentNotifier, Severity};
use std::sync::Mutex;
use uuid::Uuid;

/// Records every fulfillment call so tests can assert exactly-once side
/// effects.
#[derive(Default)]
pub struct RecordingFulfillment {
    pub succeeded: Mutex<Vec<(String, Uuid)>>,
    pub failed: Mutex<Vec<(String, String)>>,
    pub underpaid: Mutex<Vec<(String, Uuid)>>,
    pub fail_first: Mutex<u32>,
}

impl RecordingFulfillment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` notification calls fail, for exercising handler
    /// retry paths.
    pub fn fail_next(&self, n: u32) {
        *self.fail_first.lock().unwrap() = n;
    }

    fn maybe_fail(&self) -> anyhow::Result<()> {
        let mut left = self.fail_first.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            anyhow::bail!("injected notification failure");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FulfillmentNotifier for RecordingFulfillment {
    async fn on_payment_succeeded(&self, order_id: &str, attempt_id: Uuid) -> anyhow::Result<()> {
        self.maybe_fail()?;
        self.succeeded.lock().unwrap().push((order_id.to_string(), attempt_id));
        Ok(())
    }

    async fn on_payment_failed(&self, order_id: &str, reason: &str) -> anyhow::Result<()> {
        self.maybe_fail()?;
        self.failed.lock().unwrap().push((order_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn on_payment_underpaid(
        &self,
        order_id: &str,
        payment_id: Uuid,
        _received: f64,
        _expected: f64,
    ) -> anyhow::Result<()> {
        self.maybe_fail()?;
        self.underpaid.lock().unwrap().push((order_id.to_string(), payment_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    pub alerts: Mutex<Vec<(Severity, String)>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingAlerts {
    async fn raise_alert(&self, severity: Severity, message: &str, _context: serde_json::Value) {
        self.alerts.lock().unwrap().push((severity, message.to_string()));
    }
}
