//! Signing helpers for authenticated exchange endpoints
//!
//! Two primitives cover every venue this library authenticates against:
//! plain HMAC-SHA256 over a query string (hex encoded), and HS256
//! compact JWTs for venues that take a signed token on the WebSocket or
//! REST handshake.

#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod jwt;
pub mod signer;

pub use jwt::{hs256, verify_hs256};
pub use signer::QuerySigner;

/// Errors surfaced by the signing helpers.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The claims object could not be serialized
    #[error("claims serialization failed: {0}")]
    Claims(#[from] serde_json::Error),
}
