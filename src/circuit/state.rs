use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-provider breaker state. In-memory and per-process; a slightly stale
/// view is acceptable, so there is no shared store on the hot path.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider_name: String,
    pub consecutive_failures: u32,
    pub open_until: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    pub fn new(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            consecutive_failures: 0,
            open_until: None,
        }
    }

    /// Circuit open means the provider is excluded from candidate selection.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.open_until.is_some_and(|t| now < t)
    }
}

/// One more consecutive failure; opens the circuit for `cooldown` once the
/// threshold is reached.
pub fn record_failure(
    mut health: ProviderHealth,
    threshold: u32,
    cooldown: chrono::Duration,
    now: DateTime<Utc>,
) -> ProviderHealth {
    health.consecutive_failures += 1;
    if health.consecutive_failures >= threshold {
        health.open_until = Some(now + cooldown);
    }
    health
}

/// A single success resets the failure counter and closes the circuit.
pub fn record_success(mut health: ProviderHealth) -> ProviderHealth {
    health.consecutive_failures = 0;
    health.open_until = None;
    health
}
