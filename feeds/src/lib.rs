//! Unified real-time market-data clients
//!
//! One client per exchange connection, all speaking the same normalized
//! event vocabulary: subscribe to markets by symbol, receive
//! [`ClientEvent`]s regardless of venue. The machinery lives in
//! `common/` (resilient socket, liveness watcher, the generic
//! [`BaseClient`] state machine, the sharding [`MultiClient`]); the
//! per-exchange modules only translate wire formats.

#![deny(clippy::all)]

// Exchange-specific modules
pub mod binance;
pub mod coinbase;
pub mod huobi;
pub mod kraken;

// Common components
pub mod common;

pub use crate::common::adapter::{
    Adapter, BatchLimits, Capabilities, ClientConfig, Compression, Parsed, StreamKind,
};
pub use crate::common::client::{BaseClient, SubscriptionMaps};
pub use crate::common::error::FeedError;
pub use crate::common::event::{ClientEvent, MarketEvent, MultiEvent};
pub use crate::common::multi::{ClientFactory, MultiClient, MultiClientConfig};
pub use crate::common::socket::{ResilientSocket, SocketCmd, SocketConfig, SocketEvent};
pub use crate::common::watcher::LivenessWatcher;
