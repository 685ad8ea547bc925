use crate::domain::crypto::CryptoAsset;
use crate::domain::event::PaymentEvent;
use crate::domain::payment::PaymentRequest;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub mod card;
pub mod crypto_ledger;
pub mod mock;
pub mod registry;
pub mod signature;
pub mod wallet;

/// Provider-specific continuation handed back to the caller after a
/// checkout session exists.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionResult {
    ClientSecret {
        session_id: String,
        client_secret: String,
    },
    RedirectUrl {
        session_id: String,
        redirect_url: String,
    },
    PaymentAddress {
        payment_id: Uuid,
        payment_address: String,
        asset: CryptoAsset,
        crypto_amount: f64,
        exchange_rate: f64,
        expires_at: DateTime<Utc>,
        qr_payload: String,
        explorer_url: String,
    },
}

/// Transient errors are retry-eligible; permanent ones are not and fail
/// the provider immediately.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ProviderError::Transient(e.to_string())
        } else {
            ProviderError::Permanent(e.to_string())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("HTTP_{}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ProviderError::Transient(detail)
        } else {
            ProviderError::Permanent(detail)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing or malformed signature header")]
    MissingHeader,
    #[error("event timestamp outside tolerance window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    InvalidSignature,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl VerifyError {
    /// Machine-readable reason code surfaced in webhook rejections.
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::MissingHeader => "missing_header",
            VerifyError::StaleTimestamp => "stale_timestamp",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::MalformedPayload(_) => "malformed_payload",
        }
    }
}

#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Must be safely callable more than once per order: adapters pass a
    /// deterministic idempotency key so the provider deduplicates.
    async fn create_session(&self, req: &PaymentRequest) -> Result<SessionResult, ProviderError>;

    /// Timestamp skew check, constant-time signature check, then parse.
    /// The raw payload is never trusted before both checks pass.
    fn verify_callback(&self, raw_payload: &[u8], headers: &HeaderMap) -> Result<PaymentEvent, VerifyError>;

    async fn health_check(&self) -> bool;
}

/// Client-generated idempotency key, derived deterministically so repeated
/// session calls for the same order hit the same provider-side record.
pub fn idempotency_key(order_id: &str, provider_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(order_id.as_bytes());
    hasher.update(b":");
    hasher.update(provider_name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Shared verification path for HMAC-signed callbacks: skew first, then
/// constant-time signature comparison over the raw payload.
pub(crate) fn check_signed_payload(
    secret: &str,
    header_name: &str,
    headers: &HeaderMap,
    raw_payload: &[u8],
    tolerance_secs: i64,
) -> Result<(), VerifyError> {
    let header = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .ok_or(VerifyError::MissingHeader)?;
    let (timestamp, provided) =
        signature::parse_signature_header(header).ok_or(VerifyError::MissingHeader)?;

    let skew = (Utc::now().timestamp() - timestamp).abs();
    if skew > tolerance_secs {
        return Err(VerifyError::StaleTimestamp);
    }

    if !signature::verify(secret, timestamp, raw_payload, &provided) {
        return Err(VerifyError::InvalidSignature);
    }

    Ok(())
}
