//! Feed error taxonomy

use flow::CodecError;

/// Errors surfaced by the feed clients.
///
/// Nothing here is fatal to a connection except by the caller's choice:
/// transport errors drive the socket's reconnect loop, parse errors are
/// contained to the offending message, and decompression errors to the
/// offending frame. Everything crossing a task boundary becomes an
/// `Error` event rather than a panic.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The underlying socket failed; the reconnect loop handles it
    #[error("transport error: {0}")]
    Transport(String),

    /// One inbound message could not be understood; the stream continues
    #[error("{exchange} parse error: {detail}")]
    Parse {
        /// Exchange that produced the message
        exchange: &'static str,
        /// What went wrong
        detail: String,
    },

    /// A REST request failed; callers retry on their own schedule
    #[error("rest request failed: {0}")]
    Rest(#[from] reqwest::Error),

    /// A compressed frame could not be inflated
    #[error("decompression failed: {0}")]
    Codec(#[from] CodecError),

    /// A message body was not valid JSON
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
