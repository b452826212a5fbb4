//! Typed event delivery
//!
//! Instead of an emitter with string-named events, delivery is a pair of
//! enums over a channel: one variant per event type, each data variant
//! carrying its payload plus the originating [`Market`].

use crate::common::error::FeedError;
use common::{
    Auction, BlockTrade, BookTicker, Candle, Level2Snapshot, Level2Update, Level3Snapshot,
    Level3Update, Market, Ticker, Trade,
};

/// One normalized market-data payload.
#[derive(Clone, Debug, PartialEq)]
pub enum MarketEvent {
    /// 24h ticker
    Ticker(Ticker),
    /// Trade print
    Trade(Trade),
    /// OHLCV candle
    Candle(Candle),
    /// Best bid/ask
    BookTicker(BookTicker),
    /// Auction result
    Auction(Auction),
    /// Off-book negotiated trade
    BlockTrade(BlockTrade),
    /// Full level-2 book state
    Level2Snapshot(Level2Snapshot),
    /// Incremental level-2 diff
    Level2Update(Level2Update),
    /// Full level-3 book state
    Level3Snapshot(Level3Snapshot),
    /// Incremental level-3 diff
    Level3Update(Level3Update),
}

impl MarketEvent {
    /// Short stream name for logging, e.g. `"l2update"`.
    #[must_use]
    pub fn stream_name(&self) -> &'static str {
        match self {
            Self::Ticker(_) => "ticker",
            Self::Trade(_) => "trade",
            Self::Candle(_) => "candle",
            Self::BookTicker(_) => "bookticker",
            Self::Auction(_) => "auction",
            Self::BlockTrade(_) => "blocktrade",
            Self::Level2Snapshot(_) => "l2snapshot",
            Self::Level2Update(_) => "l2update",
            Self::Level3Snapshot(_) => "l3snapshot",
            Self::Level3Update(_) => "l3update",
        }
    }
}

/// Everything a [`BaseClient`](crate::BaseClient) emits.
#[derive(Debug)]
pub enum ClientEvent {
    /// The socket started a connection attempt
    Connecting,
    /// The socket is connected; subscriptions have been replayed
    Connected,
    /// The socket scheduled a reconnect attempt
    Reconnecting,
    /// The socket dropped unexpectedly; reconnect is under way
    Disconnected,
    /// An explicit close is in progress
    Closing,
    /// The client is fully closed; no further events follow
    Closed,
    /// A non-fatal error (transport, parse, decompression)
    Error(FeedError),
    /// A normalized payload with its originating market
    Data(MarketEvent, Market),
}

/// A child-client event re-emitted by a [`MultiClient`](crate::MultiClient),
/// annotated with the market whose connection produced it.
#[derive(Debug)]
pub struct MultiEvent {
    /// Market the child connection serves
    pub market: Market,
    /// The child's event
    pub event: ClientEvent,
}
