use crate::domain::crypto::{AddressObservation, CryptoAsset};
use crate::domain::event::PaymentEvent;
use crate::domain::payment::{AttemptStatus, PaymentRequest};
use crate::providers::{check_signed_payload, ProviderAdapter, ProviderError, SessionResult, VerifyError};
use axum::http::HeaderMap;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "ledger-signature";

/// On-chain payment adapter: issues a deterministic per-order deposit
/// address, converts the fiat amount at the current exchange rate, and
/// answers address queries for the confirmation tracker.
pub struct CryptoLedger {
    pub rate_api_url: String,
    pub explorer_api_url: String,
    pub wallet_seed: String,
    pub webhook_secret: String,
    pub asset: CryptoAsset,
    pub expiry_minutes: i64,
    pub timeout_ms: u64,
    pub tolerance_secs: i64,
    pub client: reqwest::Client,
    rate_cache: Mutex<HashMap<CryptoAsset, f64>>,
}

#[derive(Deserialize)]
struct AddressBody {
    received_amount: f64,
    confirmations: i32,
}

#[derive(Deserialize)]
struct LedgerEvent {
    event_id: String,
    attempt_id: Uuid,
    status: String,
    observed_at: i64,
}

impl CryptoLedger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rate_api_url: String,
        explorer_api_url: String,
        wallet_seed: String,
        webhook_secret: String,
        asset: CryptoAsset,
        expiry_minutes: i64,
        timeout_ms: u64,
        tolerance_secs: i64,
        client: reqwest::Client,
    ) -> Self {
        Self {
            rate_api_url,
            explorer_api_url,
            wallet_seed,
            webhook_secret,
            asset,
            expiry_minutes,
            timeout_ms,
            tolerance_secs,
            client,
            rate_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Deposit address derived from the wallet seed, order id and asset.
    /// Deterministic so repeated session calls reuse the same address.
    pub fn derive_address(&self, order_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.wallet_seed.as_bytes());
        hasher.update(order_id.as_bytes());
        hasher.update(self.asset.as_str().as_bytes());
        let digest = hex::encode(hasher.finalize());

        match self.asset {
            CryptoAsset::Btc => format!("bc1q{}", &digest[..38]),
            CryptoAsset::Eth | CryptoAsset::Usdt | CryptoAsset::Usdc => format!("0x{}", &digest[..40]),
        }
    }

    /// Current USD exchange rate, falling back to the last cached value
    /// when the rate API is unreachable.
    pub async fn exchange_rate(&self) -> Result<f64, ProviderError> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.rate_api_url,
            self.asset.rate_api_id()
        );

        let fetched = async {
            let resp = self
                .client
                .get(&url)
                .timeout(std::time::Duration::from_millis(self.timeout_ms))
                .send()
                .await
                .map_err(ProviderError::from_reqwest)?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(ProviderError::from_status(status, &text));
            }
            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| ProviderError::Transient(format!("bad rate response: {e}")))?;
            body.get(self.asset.rate_api_id())
                .and_then(|v| v.get("usd"))
                .and_then(|v| v.as_f64())
                .filter(|r| *r > 0.0)
                .ok_or_else(|| ProviderError::Transient("rate missing from response".to_string()))
        }
        .await;

        match fetched {
            Ok(rate) => {
                self.rate_cache.lock().unwrap().insert(self.asset, rate);
                Ok(rate)
            }
            Err(e) => match self.rate_cache.lock().unwrap().get(&self.asset) {
                Some(cached) => {
                    tracing::warn!(asset = self.asset.as_str(), "rate fetch failed, using cached rate: {e}");
                    Ok(*cached)
                }
                None => Err(e),
            },
        }
    }

    /// Received amount and confirmation depth for a deposit address, as the
    /// public ledger currently reports them.
    pub async fn query_address(&self, address: &str) -> Result<AddressObservation, ProviderError> {
        let url = format!("{}/address/{}", self.explorer_api_url, address);
        let resp = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let body: AddressBody = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("bad address response: {e}")))?;

        Ok(AddressObservation {
            received_amount: body.received_amount,
            confirmations: body.confirmations,
        })
    }

    pub fn qr_payload(&self, address: &str, crypto_amount: f64) -> String {
        format!("{}:{}?amount={:.8}", self.asset.symbol().to_lowercase(), address, crypto_amount)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for CryptoLedger {
    fn name(&self) -> &str {
        "crypto"
    }

    async fn create_session(&self, req: &PaymentRequest) -> Result<SessionResult, ProviderError> {
        let rate = self.exchange_rate().await?;
        let fiat_amount = req.amount_minor as f64 / 100.0;
        let crypto_amount = (fiat_amount / rate * 1e8).round() / 1e8;

        let payment_address = self.derive_address(&req.order_id);
        let expires_at = Utc::now() + chrono::Duration::minutes(self.expiry_minutes);

        Ok(SessionResult::PaymentAddress {
            payment_id: Uuid::new_v4(),
            qr_payload: self.qr_payload(&payment_address, crypto_amount),
            payment_address,
            asset: self.asset,
            crypto_amount,
            exchange_rate: rate,
            expires_at,
            explorer_url: self.asset.explorer_url().to_string(),
        })
    }

    fn verify_callback(&self, raw_payload: &[u8], headers: &HeaderMap) -> Result<PaymentEvent, VerifyError> {
        check_signed_payload(
            &self.webhook_secret,
            SIGNATURE_HEADER,
            headers,
            raw_payload,
            self.tolerance_secs,
        )?;

        let event: LedgerEvent = serde_json::from_slice(raw_payload)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        let new_status = match event.status.as_str() {
            "seen" => AttemptStatus::Pending,
            "confirmed" => AttemptStatus::Succeeded,
            "failed" => AttemptStatus::Failed,
            other => {
                return Err(VerifyError::MalformedPayload(format!("unknown status {other}")));
            }
        };
        let occurred_at: DateTime<Utc> = Utc
            .timestamp_opt(event.observed_at, 0)
            .single()
            .ok_or_else(|| VerifyError::MalformedPayload("bad observed_at".to_string()))?;

        Ok(PaymentEvent {
            event_id: event.event_id,
            provider_name: self.name().to_string(),
            attempt_id: event.attempt_id,
            new_status,
            occurred_at,
            raw: serde_json::from_slice(raw_payload).unwrap_or(serde_json::Value::Null),
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/ping", self.rate_api_url);
        match self
            .client
            .get(url)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
