//! HS256 compact JWT signing

use crate::AuthError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Sign `claims` into a compact HS256 JWT.
///
/// The header and claims are base64url (no padding) encoded, joined with
/// `.`, and the HMAC-SHA256 signature of that signing input is appended
/// as the third segment.
pub fn hs256(claims: &serde_json::Value, secret: &str) -> Result<String, AuthError> {
    let header = URL_SAFE_NO_PAD.encode(HEADER.as_bytes());
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{payload}");

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

/// Verify a compact HS256 token's signature against `secret`.
#[must_use]
pub fn verify_hs256(token: &str, secret: &str) -> bool {
    let mut parts = token.splitn(3, '.');
    let (Some(header), Some(payload), Some(signature)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{header}.{payload}").as_bytes());
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_shape() {
        let token = hs256(&json!({"sub": "feed", "iat": 1_700_000_000}), "secret").unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        // Header decodes to the fixed HS256 header.
        let header = URL_SAFE_NO_PAD.decode(parts[0]).unwrap();
        assert_eq!(header, HEADER.as_bytes());

        // Claims round-trip through the middle segment.
        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(claims["sub"], "feed");
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let token = hs256(&json!({"sub": "feed"}), "secret").unwrap();
        assert!(verify_hs256(&token, "secret"));
        assert!(!verify_hs256(&token, "other-secret"));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let token = hs256(&json!({"sub": "feed"}), "secret").unwrap();
        let mut tampered = token.clone();
        tampered.replace_range(0..1, "x");
        assert!(!verify_hs256(&tampered, "secret"));
        assert!(!verify_hs256("not-a-token", "secret"));
    }

    #[test]
    fn test_deterministic() {
        let claims = json!({"sub": "feed", "scope": "read"});
        assert_eq!(
            hs256(&claims, "secret").unwrap(),
            hs256(&claims, "secret").unwrap()
        );
    }
}
