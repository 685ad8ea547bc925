use crate::domain::crypto::{AddressObservation, CryptoPayment, CryptoStatus};
use chrono::{DateTime, Utc};

/// Negative slippage allowed for volatile conversions computed from a
/// cached exchange rate. Stable-value assets require the exact amount.
pub const VOLATILE_SLIPPAGE: f64 = 0.001;

/// Advances one crypto payment given a fresh ledger observation. Terminal
/// payments are returned unchanged; confirmations and received amount only
/// ever grow while the payment is live.
pub fn advance(payment: &CryptoPayment, obs: &AddressObservation, now: DateTime<Utc>) -> CryptoPayment {
    let mut updated = payment.clone();
    if payment.status.is_terminal() {
        return updated;
    }

    updated.confirmations = payment.confirmations.max(obs.confirmations);
    updated.received_amount = payment.received_amount.max(obs.received_amount);

    if now >= payment.expires_at {
        updated.status = CryptoStatus::Expired;
        return updated;
    }

    if updated.status == CryptoStatus::Awaiting && updated.received_amount > 0.0 {
        updated.status = CryptoStatus::Unconfirmed;
    }

    if updated.status == CryptoStatus::Unconfirmed
        && updated.confirmations >= updated.required_confirmations
    {
        let tolerance = if payment.asset.is_stable() { 0.0 } else { VOLATILE_SLIPPAGE };
        let floor = payment.expected_amount * (1.0 - tolerance);
        updated.status = if updated.received_amount >= floor {
            CryptoStatus::Confirmed
        } else {
            CryptoStatus::Underpaid
        };
    }

    updated
}
