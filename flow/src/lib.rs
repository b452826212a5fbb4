//! Flow-control primitives for the tickstream feed clients
//!
//! Exchange connections need their traffic shaped: subscribe requests
//! coalesced under per-message limits, reconnect triggers rate-limited,
//! and native decompression kept from fanning out across the blocking
//! pool. The pieces here are generic; the `feeds` crate wires them in.

#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod codec;
pub mod queue;
pub mod ring;
pub mod throttle;

pub use batch::Batch;
pub use codec::{CodecError, CodecOp, SerializedCodec};
pub use queue::Queue;
pub use ring::CircularBuffer;
pub use throttle::Throttle;
