use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoAsset {
    Btc,
    Eth,
    Usdt,
    Usdc,
}

impl CryptoAsset {
    pub fn symbol(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "BTC",
            CryptoAsset::Eth => "ETH",
            CryptoAsset::Usdt => "USDT",
            CryptoAsset::Usdc => "USDC",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "btc",
            CryptoAsset::Eth => "eth",
            CryptoAsset::Usdt => "usdt",
            CryptoAsset::Usdc => "usdc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "btc" | "bitcoin" => Some(CryptoAsset::Btc),
            "eth" | "ethereum" => Some(CryptoAsset::Eth),
            "usdt" => Some(CryptoAsset::Usdt),
            "usdc" => Some(CryptoAsset::Usdc),
            _ => None,
        }
    }

    pub fn required_confirmations(&self) -> i32 {
        match self {
            CryptoAsset::Btc => 3,
            CryptoAsset::Eth | CryptoAsset::Usdt | CryptoAsset::Usdc => 12,
        }
    }

    /// Stable-value assets require an exact amount; volatile conversions
    /// carry a small slippage tolerance against the cached exchange rate.
    pub fn is_stable(&self) -> bool {
        matches!(self, CryptoAsset::Usdt | CryptoAsset::Usdc)
    }

    pub fn rate_api_id(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "bitcoin",
            CryptoAsset::Eth => "ethereum",
            CryptoAsset::Usdt => "tether",
            CryptoAsset::Usdc => "usd-coin",
        }
    }

    /// Public block-explorer base the payer can use to watch the network.
    pub fn explorer_url(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "https://blockchain.info/tx/",
            CryptoAsset::Eth | CryptoAsset::Usdt | CryptoAsset::Usdc => "https://etherscan.io/tx/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoStatus {
    Awaiting,
    Unconfirmed,
    Confirmed,
    Underpaid,
    Expired,
}

impl CryptoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoStatus::Awaiting => "awaiting",
            CryptoStatus::Unconfirmed => "unconfirmed",
            CryptoStatus::Confirmed => "confirmed",
            CryptoStatus::Underpaid => "underpaid",
            CryptoStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting" => Some(CryptoStatus::Awaiting),
            "unconfirmed" => Some(CryptoStatus::Unconfirmed),
            "confirmed" => Some(CryptoStatus::Confirmed),
            "underpaid" => Some(CryptoStatus::Underpaid),
            "expired" => Some(CryptoStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CryptoStatus::Confirmed | CryptoStatus::Underpaid | CryptoStatus::Expired
        )
    }
}

/// One address-based crypto collection. Mutated only by the confirmation
/// tracker; immutable once terminal.
#[derive(Debug, Clone, Serialize)]
pub struct CryptoPayment {
    pub payment_id: Uuid,
    /// The payment attempt this collection settles.
    pub attempt_id: Uuid,
    pub order_id: String,
    pub asset: CryptoAsset,
    pub expected_amount: f64,
    pub exchange_rate: f64,
    pub payment_address: String,
    pub confirmations: i32,
    pub required_confirmations: i32,
    pub received_amount: f64,
    pub status: CryptoStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// What the public ledger reports for a payment address.
#[derive(Debug, Clone, Copy)]
pub struct AddressObservation {
    pub received_amount: f64,
    pub confirmations: i32,
}
