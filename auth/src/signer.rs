//! HMAC-SHA256 request signing

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs request payloads with HMAC-SHA256, hex encoded.
///
/// The signature scheme shared by most REST market-data endpoints that
/// require authentication: the query string is MACed with the API secret
/// and the hex digest is appended as the `signature` parameter.
#[derive(Clone)]
pub struct QuerySigner {
    secret: String,
}

impl QuerySigner {
    /// Create a signer over the given API secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign `payload`, returning the lowercase hex digest.
    #[must_use]
    pub fn sign(&self, payload: &str) -> String {
        sign_hmac_sha256(self.secret.as_bytes(), payload.as_bytes())
    }
}

/// HMAC-SHA256 of `payload` under `secret`, lowercase hex.
#[must_use]
pub fn sign_hmac_sha256(secret: &[u8], payload: &[u8]) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
