//! Order-book reconstruction from snapshots and sequenced diffs
//!
//! Two book families cover the venues this library speaks to:
//! [`Level2Book`] keeps price-aggregated levels in sorted arrays with the
//! best price at the hot end, and can CRC32-checksum its top levels the
//! way checksum-publishing venues do; [`Level3Book`] keeps individual
//! resting orders keyed by order id and aggregates to price levels only
//! on demand.
//!
//! Neither book self-heals a sequence gap: `apply_sequenced` reports the
//! gap and leaves the book untouched, and the caller is expected to
//! discard the book and fetch a fresh snapshot.

#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod l2;
pub mod l3;

pub use error::BookError;
pub use l2::{BookLevel, Level2Book};
pub use l3::{Level3Book, Level3Order};
