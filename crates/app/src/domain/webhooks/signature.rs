//! Webhook signature verification: HMAC-SHA256 over the raw request body
//! with a preshared secret, hex-encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex signature for a body. Gateways and tests use this to sign
/// outgoing callbacks.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        // HMAC accepts keys of any length.
        return String::new();
    };

    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hex signature.
#[must_use]
pub fn verify(secret: &str, body: &[u8], provided: &str) -> bool {
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(body);

    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    #[test]
    fn valid_signature_is_accepted() {
        let body = br#"{"order_id":"x","status":"success"}"#;

        let signature = sign(SECRET, body);

        assert!(verify(SECRET, body, &signature));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = br#"{"order_id":"x","status":"success"}"#;

        let signature = sign("wrong_secret", body);

        assert!(!verify(SECRET, body, &signature));
    }

    #[test]
    fn modified_payload_is_rejected() {
        let body = br#"{"order_id":"x","status":"success"}"#;
        let tampered = br#"{"order_id":"x","status":"failed"}"#;

        let signature = sign(SECRET, body);

        assert!(!verify(SECRET, tampered, &signature));
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        assert!(!verify(SECRET, b"{}", "not-a-valid-hex-signature"));
        assert!(!verify(SECRET, b"{}", ""));
    }

    #[test]
    fn binary_bodies_are_signable() {
        let body = &[0x00, 0x01, 0x02, 0xFF, 0xFE, 0xFD];

        let signature = sign(SECRET, body);

        assert!(verify(SECRET, body, &signature));
    }
}
