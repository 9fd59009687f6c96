// Webhook payload signing
//
// Compact hex signature: HMAC-SHA256 over "<unix-ts>.<raw-body>" with key
// SHA-256(endpoint_secret). The server stores only that digest, which is
// exactly the signing key; the receiver holds the plaintext secret and
// derives the same key. Receivers bound |now - ts| to 300 seconds against
// replay.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Replay window receivers should enforce
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Header names on outbound deliveries
pub const SIGNATURE_HEADER: &str = "X-Penshort-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Penshort-Timestamp";
pub const DELIVERY_ID_HEADER: &str = "X-Penshort-Delivery-Id";

/// SHA-256 of the plaintext secret, hex-encoded: the stored form and the
/// HMAC key
pub fn secret_digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Sign with a hex-encoded key digest as stored on the endpoint
pub fn sign_with_digest(key_digest_hex: &str, timestamp: i64, body: &str) -> String {
    let key = hex::decode(key_digest_hex).unwrap_or_else(|_| key_digest_hex.as_bytes().to_vec());
    let mut mac = HmacSha256::new_from_slice(&key).expect("hmac accepts any key length");
    mac.update(format!("{}.{}", timestamp, body).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Receiver-side signing from the plaintext secret
pub fn sign(secret: &str, timestamp: i64, body: &str) -> String {
    sign_with_digest(&secret_digest(secret), timestamp, body)
}

/// Receiver-side check: recompute and compare in constant time, rejecting
/// stale timestamps
pub fn verify(secret: &str, timestamp: i64, body: &str, signature: &str, now: i64) -> bool {
    if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return false;
    }
    let expected = sign(secret, timestamp, body);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic() {
        let sig = sign("whsec_abc", 1700000000, r#"{"event_type":"click"}"#);
        assert_eq!(sig, sign("whsec_abc", 1700000000, r#"{"event_type":"click"}"#));
        assert_eq!(sig.len(), 64);
        assert!(sig.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_stored_digest_signs_identically() {
        // The worker never sees the plaintext; its digest-keyed signature
        // must match what a secret-holding receiver computes
        let digest = secret_digest("whsec_abc");
        assert_eq!(
            sign_with_digest(&digest, 1700000000, "body"),
            sign("whsec_abc", 1700000000, "body")
        );
    }

    #[test]
    fn test_signature_binds_all_inputs() {
        let base = sign("whsec_abc", 1700000000, "body");
        assert_ne!(base, sign("whsec_abd", 1700000000, "body"));
        assert_ne!(base, sign("whsec_abc", 1700000001, "body"));
        assert_ne!(base, sign("whsec_abc", 1700000000, "body2"));
    }

    #[test]
    fn test_verify_round_trip() {
        let ts = 1700000000;
        let sig = sign("whsec_abc", ts, "body");
        assert!(verify("whsec_abc", ts, "body", &sig, ts + 10));
        assert!(!verify("whsec_abc", ts, "body", &sig, ts + TIMESTAMP_TOLERANCE_SECS + 1));
        assert!(!verify("whsec_abc", ts, "tampered", &sig, ts));
        assert!(!verify("wrong", ts, "body", &sig, ts));
    }
}
