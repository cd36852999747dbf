//! Request authentication between resource servers and the facilitator.
//!
//! Callers sign the raw request body with a shared secret and send the hex MAC
//! in [`AUTH_HEADER`]. The facilitator refuses `/verify` and `/settle` without it.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::X402Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 of the request body.
pub const AUTH_HEADER: &str = "X-Facilitator-Auth";

fn keyed(secret: &[u8]) -> Result<HmacSha256, X402Error> {
    HmacSha256::new_from_slice(secret)
        .map_err(|e| X402Error::ConfigError(format!("invalid HMAC key: {e}")))
}

/// Sign a request body. Returns the hex MAC to put in [`AUTH_HEADER`].
pub fn sign_body(secret: &[u8], body: &[u8]) -> Result<String, X402Error> {
    let mut mac = keyed(secret)?;
    mac.update(body);
    Ok(alloy::hex::encode(mac.finalize().into_bytes()))
}

/// Check the MAC a caller sent for `body`. An optional `0x` prefix is accepted.
///
/// Malformed hex is compared as zeros so the rejection path costs the same.
pub fn verify_body(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = keyed(secret) else {
        return false;
    };
    mac.update(body);

    let provided = alloy::hex::decode(signature.trim()).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"facilitator-shared-secret";

    #[test]
    fn test_signed_body_verifies() {
        let body = br#"{"paymentPayload":{},"paymentRequirements":{}}"#;
        let mac = sign_body(SECRET, body).unwrap();
        assert_eq!(mac.len(), 64);
        assert!(verify_body(SECRET, body, &mac));
        assert!(verify_body(SECRET, body, &format!("0x{mac}")));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let mac = sign_body(b"secret-1", b"body").unwrap();
        assert!(!verify_body(b"secret-2", b"body", &mac));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let mac = sign_body(SECRET, br#"{"amount":"1000"}"#).unwrap();
        assert!(!verify_body(SECRET, br#"{"amount":"1001"}"#, &mac));
    }

    #[test]
    fn test_garbage_header_rejected() {
        assert!(!verify_body(SECRET, b"body", "not-hex-zz"));
        assert!(!verify_body(SECRET, b"body", ""));
    }
}
