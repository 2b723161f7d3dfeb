// src/utils/signature.rs

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex HMAC-SHA256 of a raw request body.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded HMAC-SHA256 signature against a raw body.
///
/// The comparison runs in constant time via `Mac::verify_slice`; a malformed
/// hex string simply fails verification.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let expected = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"messageId":"m-1"}"#;
        let sig = sign_body("topsecret", body);
        assert!(verify_signature("topsecret", body, &sig));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign_body("topsecret", b"payload");
        assert!(!verify_signature("topsecret", b"payload2", &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign_body("topsecret", b"payload");
        assert!(!verify_signature("othersecret", b"payload", &sig));
    }

    #[test]
    fn malformed_hex_fails() {
        assert!(!verify_signature("topsecret", b"payload", "not-hex"));
    }
}
