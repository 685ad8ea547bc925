use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Parses a `t=<unix>,v1=<hex>` signature header.
pub fn parse_signature_header(header: &str) -> Option<(i64, String)> {
    let mut timestamp = None;
    let mut v1 = None;

    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => v1 = Some(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, v1) {
        (Some(t), Some(sig)) if !sig.is_empty() => Some((t, sig)),
        _ => None,
    }
}

/// HMAC-SHA256 over the provider signing string `{timestamp}.{payload}`,
/// hex-encoded.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of the expected signature against the one the
/// provider sent.
pub fn verify(secret: &str, timestamp: i64, payload: &[u8], provided_hex: &str) -> bool {
    let expected = sign(secret, timestamp, payload);
    expected.as_bytes().ct_eq(provided_hex.as_bytes()).into()
}
