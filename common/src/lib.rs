//! Common types for the tickstream market-data library
//!
//! Canonical market identity and the normalized event types every
//! exchange adapter translates into.

#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod events;
pub mod market;

pub use events::*;
pub use market::{Market, Side};
