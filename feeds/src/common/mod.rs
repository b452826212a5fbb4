//! Components shared by every exchange client

pub mod adapter;
pub mod client;
pub mod error;
pub mod event;
pub mod multi;
pub mod rest;
pub mod socket;
pub mod watcher;

pub use adapter::{Adapter, BatchLimits, Capabilities, ClientConfig, Compression, Parsed, StreamKind};
pub use client::{BaseClient, SubscriptionMaps};
pub use error::FeedError;
pub use event::{ClientEvent, MarketEvent, MultiEvent};
pub use multi::{ClientFactory, MultiClient, MultiClientConfig};
pub use socket::{ResilientSocket, SocketConfig, SocketCmd, SocketEvent};
pub use watcher::LivenessWatcher;
