// libs/payment-cell/src/services/signature.rs
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &str, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(mac)
}

/// Lowercase hex HMAC-SHA256 of `payload`, the form Razorpay sends.
pub fn sign(secret: &str, payload: &[u8]) -> Option<String> {
    keyed(secret, payload).map(|mac| to_hex(&mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature.
pub fn verify(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some(expected) = from_hex(signature_hex.trim()) else {
        return false;
    };

    keyed(secret, payload).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}

/// Checkout callback: signed over `order_id|payment_id` with the key secret.
pub fn verify_checkout_signature(key_secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let payload = format!("{}|{}", order_id, payment_id);
    verify(key_secret, payload.as_bytes(), signature)
}

/// Webhooks: signed over the raw request body with the webhook secret.
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    verify(webhook_secret, body, signature)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_checkout_signature() {
        let signature = sign("rzp_test_secret", b"order_ABC|pay_XYZ").unwrap();

        assert!(verify_checkout_signature("rzp_test_secret", "order_ABC", "pay_XYZ", &signature));
        assert!(verify_checkout_signature("rzp_test_secret", "order_ABC", "pay_XYZ", &signature.to_uppercase()));
        assert!(!verify_checkout_signature("rzp_test_secret", "order_ABC", "pay_OTHER", &signature));
        assert!(!verify_checkout_signature("wrong", "order_ABC", "pay_XYZ", &signature));
        assert!(!verify_checkout_signature("", "order_ABC", "pay_XYZ", &signature));
    }

    #[test]
    fn test_malformed_signatures_rejected() {
        let body = br#"{"event":"payment.captured"}"#;
        assert!(!verify_webhook_signature("rzp_webhook_secret", body, ""));
        assert!(!verify_webhook_signature("rzp_webhook_secret", body, "abc"));
        assert!(!verify_webhook_signature("rzp_webhook_secret", body, "zz"));
        assert!(!verify_webhook_signature("rzp_webhook_secret", body, "é0"));
    }

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(from_hex("00ff10"), Some(vec![0x00, 0xff, 0x10]));
        assert_eq!(to_hex(&[0x00, 0xff, 0x10]), "00ff10");
    }
}
