//! Normalized market-data event types
//!
//! Every adapter translates its exchange's wire messages into these
//! structs. All price and size fields are carried as decimal strings in
//! the exchange's exact lexical form: order-book checksums and exact
//! aggregation both depend on the original representation, so nothing in
//! the pipeline converts through floating point.

use crate::market::Side;
use serde::{Deserialize, Serialize};

/// Normalized 24h ticker
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Exchange identifier, e.g. `"binance"`
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Event time in milliseconds since the UNIX epoch
    pub timestamp_ms: u64,
    /// Last traded price
    pub last: String,
    /// Open price of the rolling window
    pub open: Option<String>,
    /// High price of the rolling window
    pub high: Option<String>,
    /// Low price of the rolling window
    pub low: Option<String>,
    /// Base-asset volume of the rolling window
    pub volume: Option<String>,
    /// Quote-asset volume of the rolling window
    pub quote_volume: Option<String>,
    /// Absolute price change over the window
    pub change: Option<String>,
    /// Percentage price change over the window
    pub change_percent: Option<String>,
    /// Best bid price
    pub bid: Option<String>,
    /// Size resting at the best bid
    pub bid_volume: Option<String>,
    /// Best ask price
    pub ask: Option<String>,
    /// Size resting at the best ask
    pub ask_volume: Option<String>,
}

/// Normalized trade (tape) event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Exchange-native trade id
    pub trade_id: String,
    /// Trade time in milliseconds since the UNIX epoch
    pub unix_ms: u64,
    /// Taker side
    pub side: Side,
    /// Execution price
    pub price: String,
    /// Executed amount in base units
    pub amount: String,
    /// Resting buy order id, when the venue exposes it
    pub buy_order_id: Option<String>,
    /// Resting sell order id, when the venue exposes it
    pub sell_order_id: Option<String>,
}

impl Trade {
    /// Create a trade with the universally available fields
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        base: impl Into<String>,
        quote: impl Into<String>,
        trade_id: impl Into<String>,
        unix_ms: u64,
        side: Side,
        price: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            base: base.into(),
            quote: quote.into(),
            trade_id: trade_id.into(),
            unix_ms,
            side,
            price: price.into(),
            amount: amount.into(),
            buy_order_id: None,
            sell_order_id: None,
        }
    }
}

/// Normalized OHLCV candle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Candle open time in milliseconds since the UNIX epoch
    pub timestamp_ms: u64,
    /// Open price
    pub open: String,
    /// High price
    pub high: String,
    /// Low price
    pub low: String,
    /// Close price
    pub close: String,
    /// Base-asset volume
    pub volume: String,
}

/// Normalized best-bid/best-ask event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Event time in milliseconds since the UNIX epoch
    pub timestamp_ms: u64,
    /// Best bid price
    pub bid: String,
    /// Size resting at the best bid
    pub bid_size: String,
    /// Best ask price
    pub ask: String,
    /// Size resting at the best ask
    pub ask_size: String,
}

/// Normalized auction (opening/closing cross) result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Auction time in milliseconds since the UNIX epoch
    pub timestamp_ms: u64,
    /// Clearing price of the auction
    pub price: String,
    /// Quantity crossed at the clearing price
    pub amount: String,
    /// Highest bid entering the auction, when published
    pub high: Option<String>,
    /// Lowest ask entering the auction, when published
    pub low: Option<String>,
}

/// Normalized block (off-book negotiated) trade
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockTrade {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Exchange-native trade id
    pub trade_id: String,
    /// Trade time in milliseconds since the UNIX epoch
    pub unix_ms: u64,
    /// Negotiated price
    pub price: String,
    /// Negotiated amount in base units
    pub amount: String,
}

/// One price level of a level-2 (price-aggregated) book
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level2Point {
    /// Price of the level
    pub price: String,
    /// Aggregate size resting at the level; `"0"` removes the level
    pub size: String,
    /// Number of orders at the level, when the venue exposes it
    pub count: Option<u64>,
}

impl Level2Point {
    /// Create a price level without an order count
    #[must_use]
    pub fn new(price: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            size: size.into(),
            count: None,
        }
    }
}

/// Full point-in-time state of a level-2 book
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level2Snapshot {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Venue sequence id of the snapshot, when sequenced
    pub sequence_id: Option<u64>,
    /// Snapshot time in milliseconds since the UNIX epoch
    pub timestamp_ms: Option<u64>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<Level2Point>,
    /// Bid levels, best (highest) first
    pub bids: Vec<Level2Point>,
}

/// Incremental diff to be applied atop a prior level-2 snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level2Update {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Venue sequence id of the diff, when sequenced
    pub sequence_id: Option<u64>,
    /// First sequence id covered by the diff, on venues that batch
    pub first_sequence_id: Option<u64>,
    /// Event time in milliseconds since the UNIX epoch
    pub timestamp_ms: Option<u64>,
    /// Changed ask levels
    pub asks: Vec<Level2Point>,
    /// Changed bid levels
    pub bids: Vec<Level2Point>,
    /// Venue-published CRC32 checksum of the resulting book, when sent
    pub checksum: Option<u32>,
}

/// Action carried by a level-3 point
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum L3Action {
    /// A new resting order entered the book
    Open,
    /// The order left the book (filled or cancelled)
    Done,
    /// The order's resting size changed to the carried size
    Change,
    /// The carried size was matched (executed) against the order
    Match,
}

/// One individual order of a level-3 (order-granular) book
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level3Point {
    /// Exchange-native order id
    pub order_id: String,
    /// Price of the order
    pub price: String,
    /// Size of the order (meaning depends on `action`)
    pub size: String,
    /// Event time in milliseconds since the UNIX epoch
    pub timestamp_ms: Option<u64>,
    /// What happened to the order; `None` inside snapshots (resting order)
    pub action: Option<L3Action>,
}

impl Level3Point {
    /// Create a resting-order point (no action), as carried by snapshots
    #[must_use]
    pub fn resting(
        order_id: impl Into<String>,
        price: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            price: price.into(),
            size: size.into(),
            timestamp_ms: None,
            action: None,
        }
    }

    /// Create a point carrying an explicit action
    #[must_use]
    pub fn with_action(
        order_id: impl Into<String>,
        price: impl Into<String>,
        size: impl Into<String>,
        action: L3Action,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            price: price.into(),
            size: size.into(),
            timestamp_ms: None,
            action: Some(action),
        }
    }
}

/// Full point-in-time state of a level-3 book
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level3Snapshot {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Venue sequence id of the snapshot, when sequenced
    pub sequence_id: Option<u64>,
    /// Snapshot time in milliseconds since the UNIX epoch
    pub timestamp_ms: Option<u64>,
    /// Resting ask orders, best price first
    pub asks: Vec<Level3Point>,
    /// Resting bid orders, best price first
    pub bids: Vec<Level3Point>,
}

/// Incremental order-granular diff atop a prior level-3 snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level3Update {
    /// Exchange identifier
    pub exchange: String,
    /// Base currency code
    pub base: String,
    /// Quote currency code
    pub quote: String,
    /// Venue sequence id of the diff, when sequenced
    pub sequence_id: Option<u64>,
    /// Event time in milliseconds since the UNIX epoch
    pub timestamp_ms: Option<u64>,
    /// Changed ask-side orders
    pub asks: Vec<Level3Point>,
    /// Changed bid-side orders
    pub bids: Vec<Level3Point>,
}
