//! Binance adapter
//!
//! Speaks the combined-stream endpoint: subscriptions go out as
//! `SUBSCRIBE`/`UNSUBSCRIBE` frames (many streams per frame) and every
//! inbound message arrives wrapped as `{"stream": ..., "data": ...}`.
//! Level-2 diffs carry `U`/`u` sequence bounds; the REST depth endpoint
//! provides the snapshot to seed a book from.

use crate::common::adapter::{
    Adapter, BatchLimits, Capabilities, ClientConfig, Parsed, StreamKind,
};
use crate::common::client::{BaseClient, SubscriptionMaps};
use crate::common::error::FeedError;
use crate::common::event::{ClientEvent, MarketEvent};
use crate::common::rest;
use common::{Candle, Level2Point, Level2Snapshot, Level2Update, Market, Side, Ticker, Trade};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Combined-stream WebSocket endpoint.
pub const WS_URL: &str = "wss://stream.binance.com:9443/stream";
/// REST endpoint for depth snapshots.
pub const API_URL: &str = "https://api.binance.com";

const EXCHANGE: &str = "binance";

/// Create a Binance client with default options.
pub fn client() -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    client_with(ClientConfig::new(WS_URL))
}

/// Create a Binance client with custom options.
pub fn client_with(config: ClientConfig) -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    BaseClient::new(BinanceAdapter::new(), config)
}

/// Fetch a depth snapshot over REST, for seeding a level-2 book.
pub async fn fetch_depth_snapshot(market: &Market, limit: u32) -> Result<Level2Snapshot, FeedError> {
    let url = format!(
        "{API_URL}/api/v3/depth?symbol={}&limit={limit}",
        market.id.to_uppercase()
    );
    let value = rest::get_json(&url).await?;
    let snapshot: DepthSnapshotMsg = serde_json::from_value(value)?;
    Ok(Level2Snapshot {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        sequence_id: Some(snapshot.last_update_id),
        timestamp_ms: None,
        asks: points(&snapshot.asks),
        bids: points(&snapshot.bids),
    })
}

/// Wire translation for Binance combined streams.
pub struct BinanceAdapter {
    next_id: u64,
}

impl BinanceAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    fn stream_suffix(kind: StreamKind) -> Option<&'static str> {
        match kind {
            StreamKind::Ticker => Some("ticker"),
            StreamKind::Trades => Some("trade"),
            StreamKind::Candles => Some("kline_1m"),
            StreamKind::Level2Snapshots => Some("depth20@100ms"),
            StreamKind::Level2Updates => Some("depth@100ms"),
            StreamKind::Level3Snapshots | StreamKind::Level3Updates => None,
        }
    }

    fn frame(&mut self, method: &str, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        let Some(suffix) = Self::stream_suffix(kind) else {
            return Vec::new();
        };
        let params: Vec<String> = remote_ids
            .iter()
            .map(|id| format!("{}@{suffix}", id.to_lowercase()))
            .collect();
        let id = self.next_id;
        self.next_id += 1;
        vec![
            serde_json::json!({
                "method": method,
                "params": params,
                "id": id,
            })
            .to_string(),
        ]
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for BinanceAdapter {
    fn exchange(&self) -> &'static str {
        EXCHANGE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tickers: true,
            trades: true,
            candles: true,
            level2_snapshots: true,
            level2_updates: true,
            ..Capabilities::default()
        }
    }

    fn subscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        self.frame("SUBSCRIBE", kind, remote_ids)
    }

    fn unsubscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        self.frame("UNSUBSCRIBE", kind, remote_ids)
    }

    fn parse(&mut self, raw: &str, subs: &SubscriptionMaps) -> Result<Parsed, FeedError> {
        let envelope: serde_json::Value = serde_json::from_str(raw)?;

        // Command acknowledgements look like {"result": null, "id": 1}.
        let Some(stream) = envelope.get("stream").and_then(|s| s.as_str()) else {
            return Ok(Parsed::empty());
        };
        let Some(data) = envelope.get("data") else {
            return Ok(Parsed::empty());
        };
        let (symbol, channel) = stream.split_once('@').ok_or_else(|| FeedError::Parse {
            exchange: EXCHANGE,
            detail: format!("malformed stream name '{stream}'"),
        })?;

        let parsed = if channel.starts_with("trade") {
            let msg: TradeMsg = serde_json::from_value(data.clone())?;
            match find_market(subs, StreamKind::Trades, &msg.symbol) {
                Some(market) => trade_event(&msg, market),
                None => Parsed::empty(),
            }
        } else if channel.starts_with("ticker") {
            let msg: TickerMsg = serde_json::from_value(data.clone())?;
            match find_market(subs, StreamKind::Ticker, &msg.symbol) {
                Some(market) => ticker_event(&msg, market),
                None => Parsed::empty(),
            }
        } else if channel.starts_with("kline") {
            let msg: KlineMsg = serde_json::from_value(data.clone())?;
            match find_market(subs, StreamKind::Candles, &msg.symbol) {
                Some(market) => candle_event(&msg, market),
                None => Parsed::empty(),
            }
        } else if channel.starts_with("depth20") {
            // Partial-depth frames carry no symbol; the stream name does.
            let msg: Depth20Msg = serde_json::from_value(data.clone())?;
            match find_market(subs, StreamKind::Level2Snapshots, symbol) {
                Some(market) => snapshot_event(&msg, market),
                None => Parsed::empty(),
            }
        } else if channel.starts_with("depth") {
            let msg: DepthUpdateMsg = serde_json::from_value(data.clone())?;
            match find_market(subs, StreamKind::Level2Updates, &msg.symbol) {
                Some(market) => update_event(&msg, market),
                None => Parsed::empty(),
            }
        } else {
            Parsed::empty()
        };
        Ok(parsed)
    }

    fn subscribe_batch(&self) -> Option<BatchLimits> {
        Some(BatchLimits {
            max_per_frame: 100,
            collect: Duration::ZERO,
        })
    }
}

/// Look a symbol up tolerating case differences between the wire form
/// and the id the consumer subscribed with.
fn find_market<'a>(
    subs: &'a SubscriptionMaps,
    kind: StreamKind,
    symbol: &str,
) -> Option<&'a Market> {
    subs.market_for(kind, symbol)
        .or_else(|| subs.market_for(kind, &symbol.to_uppercase()))
        .or_else(|| subs.market_for(kind, &symbol.to_lowercase()))
}

fn points(raw: &[[String; 2]]) -> Vec<Level2Point> {
    raw.iter()
        .map(|[price, size]| Level2Point::new(price.clone(), size.clone()))
        .collect()
}

fn trade_event(msg: &TradeMsg, market: &Market) -> Parsed {
    let side = if msg.is_buyer_maker {
        Side::Sell
    } else {
        Side::Buy
    };
    let trade = Trade::new(
        EXCHANGE,
        market.base.clone(),
        market.quote.clone(),
        msg.trade_id.to_string(),
        msg.trade_time,
        side,
        msg.price.clone(),
        msg.quantity.clone(),
    );
    Parsed::event(MarketEvent::Trade(trade), market.clone())
}

fn ticker_event(msg: &TickerMsg, market: &Market) -> Parsed {
    let ticker = Ticker {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        timestamp_ms: msg.event_time,
        last: msg.last_price.clone(),
        open: Some(msg.open.clone()),
        high: Some(msg.high.clone()),
        low: Some(msg.low.clone()),
        volume: Some(msg.volume.clone()),
        quote_volume: Some(msg.quote_volume.clone()),
        change: Some(msg.price_change.clone()),
        change_percent: Some(msg.price_change_percent.clone()),
        bid: Some(msg.best_bid.clone()),
        bid_volume: Some(msg.best_bid_qty.clone()),
        ask: Some(msg.best_ask.clone()),
        ask_volume: Some(msg.best_ask_qty.clone()),
    };
    Parsed::event(MarketEvent::Ticker(ticker), market.clone())
}

fn candle_event(msg: &KlineMsg, market: &Market) -> Parsed {
    let candle = Candle {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        timestamp_ms: msg.kline.open_time,
        open: msg.kline.open.clone(),
        high: msg.kline.high.clone(),
        low: msg.kline.low.clone(),
        close: msg.kline.close.clone(),
        volume: msg.kline.volume.clone(),
    };
    Parsed::event(MarketEvent::Candle(candle), market.clone())
}

fn snapshot_event(msg: &Depth20Msg, market: &Market) -> Parsed {
    let snapshot = Level2Snapshot {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        sequence_id: Some(msg.last_update_id),
        timestamp_ms: None,
        asks: points(&msg.asks),
        bids: points(&msg.bids),
    };
    Parsed::event(MarketEvent::Level2Snapshot(snapshot), market.clone())
}

fn update_event(msg: &DepthUpdateMsg, market: &Market) -> Parsed {
    let update = Level2Update {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        sequence_id: Some(msg.final_update_id),
        first_sequence_id: Some(msg.first_update_id),
        timestamp_ms: Some(msg.event_time),
        asks: points(&msg.asks),
        bids: points(&msg.bids),
        checksum: None,
    };
    Parsed::event(MarketEvent::Level2Update(update), market.clone())
}

#[derive(Debug, Deserialize)]
struct TradeMsg {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "t")]
    trade_id: u64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time: u64,
    #[serde(rename = "m")]
    is_buyer_maker: bool,
}

#[derive(Debug, Deserialize)]
struct TickerMsg {
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price_change: String,
    #[serde(rename = "P")]
    price_change_percent: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "q")]
    quote_volume: String,
    #[serde(rename = "b")]
    best_bid: String,
    #[serde(rename = "B")]
    best_bid_qty: String,
    #[serde(rename = "a")]
    best_ask: String,
    #[serde(rename = "A")]
    best_ask_qty: String,
}

#[derive(Debug, Deserialize)]
struct KlineMsg {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: Kline,
}

#[derive(Debug, Deserialize)]
struct Kline {
    #[serde(rename = "t")]
    open_time: u64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
}

#[derive(Debug, Deserialize)]
struct DepthUpdateMsg {
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct Depth20Msg {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct DepthSnapshotMsg {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}
