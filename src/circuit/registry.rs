use crate::circuit::state::{record_failure, record_success, ProviderHealth};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: chrono::Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: chrono::Duration::minutes(5),
        }
    }
}

/// Process-local registry of breaker state, keyed by provider name.
pub struct HealthRegistry {
    settings: BreakerSettings,
    inner: Mutex<HashMap<String, ProviderHealth>>,
}

impl HealthRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_open(&self, provider_name: &str, now: DateTime<Utc>) -> bool {
        self.inner
            .lock()
            .unwrap()
            .get(provider_name)
            .map(|h| h.is_open(now))
            .unwrap_or(false)
    }

    pub fn on_failure(&self, provider_name: &str, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let health = inner
            .remove(provider_name)
            .unwrap_or_else(|| ProviderHealth::new(provider_name));
        let updated = record_failure(health, self.settings.failure_threshold, self.settings.cooldown, now);
        if updated.is_open(now) {
            tracing::warn!(
                provider = provider_name,
                failures = updated.consecutive_failures,
                "circuit opened"
            );
        }
        inner.insert(provider_name.to_string(), updated);
    }

    pub fn on_success(&self, provider_name: &str) {
        let mut inner = self.inner.lock().unwrap();
        let health = inner
            .remove(provider_name)
            .unwrap_or_else(|| ProviderHealth::new(provider_name));
        inner.insert(provider_name.to_string(), record_success(health));
    }

    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let mut rows: Vec<ProviderHealth> = self.inner.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| a.provider_name.cmp(&b.provider_name));
        rows
    }
}
