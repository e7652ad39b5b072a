//! Cryptographic utilities for webhook verification.
//!
//! Razorpay signs webhook bodies with a hex HMAC-SHA256; LiveKit embeds a base64
//! SHA-256 of the body in a signed JWT.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the hex-encoded result (64 characters).
///
/// Returns `None` only if the HMAC implementation rejects the key, which
/// RFC 2104 rules out for SHA-256.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature in constant time.
#[must_use]
pub fn verify_hmac_sha256_hex(secret: &str, message: &str, signature: &str) -> bool {
    hmac_sha256_hex(secret, message)
        .is_some_and(|expected| constant_time_eq(&expected, &signature.to_ascii_lowercase()))
}

/// SHA-256 of `body`, base64 encoded.
#[must_use]
pub fn sha256_base64(body: &[u8]) -> String {
    BASE64.encode(Sha256::digest(body))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_matches_known_vector() {
        // RFC 4231 test case 2
        let result = hmac_sha256_hex("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            result,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let sig = hmac_sha256_hex("secret", "body").unwrap().to_uppercase();
        assert!(verify_hmac_sha256_hex("secret", "body", &sig));
        assert!(!verify_hmac_sha256_hex("other", "body", &sig));
    }

    #[test]
    fn sha256_base64_of_empty_body() {
        assert_eq!(
            sha256_base64(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn constant_time_eq_different_strings() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
