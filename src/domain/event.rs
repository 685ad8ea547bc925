use crate::domain::payment::AttemptStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized form of a verified provider callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider-assigned id, unique per provider.
    pub event_id: String,
    pub provider_name: String,
    pub attempt_id: Uuid,
    pub new_status: AttemptStatus,
    pub occurred_at: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// Recorded result of processing one provider event. Stored against the
/// `(provider_name, event_id)` key so redeliveries can be answered without
/// re-running the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Applied,
    InvalidTransition,
    HandlerFailed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::InvalidTransition => "invalid_transition",
            EventOutcome::HandlerFailed => "handler_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(EventOutcome::Applied),
            "invalid_transition" => Some(EventOutcome::InvalidTransition),
            "handler_failed" => Some(EventOutcome::HandlerFailed),
            _ => None,
        }
    }
}
