//! Error types for order-book operations

/// Errors surfaced while building or updating a book.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    /// A price or size string was not a valid decimal
    #[error("invalid decimal value '{0}'")]
    InvalidDecimal(String),

    /// A sequenced diff skipped ahead; the book must be resynced
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap {
        /// Sequence id the book expected next
        expected: u64,
        /// Sequence id the diff carried
        got: u64,
    },

    /// A sequenced diff was already applied; safe to drop
    #[error("stale update: last applied {last}, got {got}")]
    StaleUpdate {
        /// Sequence id last applied to the book
        last: u64,
        /// Sequence id the diff carried
        got: u64,
    },

    /// A sequenced apply was requested but the diff carries no id
    #[error("update carries no sequence id")]
    MissingSequence,
}
