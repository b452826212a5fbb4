//! Huobi adapter
//!
//! Every frame arrives as a gzip-compressed binary payload — the client
//! inflates through its serialized codec before parsing. The protocol
//! heartbeat is JSON (`{"ping": n}` answered with `{"pong": n}`), wired
//! through the parse result's replies. Depth frames are full top-N
//! states, normalized as level-2 snapshots.

use crate::common::adapter::{
    Adapter, Capabilities, ClientConfig, Compression, Parsed, StreamKind,
};
use crate::common::client::{BaseClient, SubscriptionMaps};
use crate::common::error::FeedError;
use crate::common::event::{ClientEvent, MarketEvent};
use common::{Level2Point, Level2Snapshot, Market, Side, Ticker, Trade};
use serde_json::Value;
use tokio::sync::mpsc;

/// Public WebSocket endpoint.
pub const WS_URL: &str = "wss://api.huobi.pro/ws";

const EXCHANGE: &str = "huobi";

/// Create a Huobi client with default options.
pub fn client() -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    client_with(ClientConfig::new(WS_URL))
}

/// Create a Huobi client with custom options.
pub fn client_with(config: ClientConfig) -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    BaseClient::new(HuobiAdapter::new(), config)
}

/// Wire translation for Huobi market channels.
pub struct HuobiAdapter {
    next_id: u64,
}

impl HuobiAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    fn topic(kind: StreamKind, remote_id: &str) -> Option<String> {
        match kind {
            StreamKind::Ticker => Some(format!("market.{remote_id}.detail")),
            StreamKind::Trades => Some(format!("market.{remote_id}.trade.detail")),
            StreamKind::Level2Snapshots => Some(format!("market.{remote_id}.depth.step0")),
            _ => None,
        }
    }

    fn frames(&mut self, verb: &str, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        remote_ids
            .iter()
            .filter_map(|id| Self::topic(kind, id))
            .map(|topic| {
                let mut frame = serde_json::Map::new();
                frame.insert(verb.to_string(), Value::String(topic));
                frame.insert("id".to_string(), Value::String(self.next_id.to_string()));
                self.next_id += 1;
                Value::Object(frame).to_string()
            })
            .collect()
    }
}

impl Default for HuobiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for HuobiAdapter {
    fn exchange(&self) -> &'static str {
        EXCHANGE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tickers: true,
            trades: true,
            level2_snapshots: true,
            ..Capabilities::default()
        }
    }

    fn subscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        self.frames("sub", kind, remote_ids)
    }

    fn unsubscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        self.frames("unsub", kind, remote_ids)
    }

    fn parse(&mut self, raw: &str, subs: &SubscriptionMaps) -> Result<Parsed, FeedError> {
        let value: Value = serde_json::from_str(raw)?;

        // Protocol heartbeat; the server disconnects unanswered clients.
        if let Some(ping) = value.get("ping") {
            return Ok(Parsed::reply(
                serde_json::json!({ "pong": ping }).to_string(),
            ));
        }

        // Subscription acks carry "status"; data carries "ch".
        let Some(channel) = value.get("ch").and_then(Value::as_str) else {
            return Ok(Parsed::empty());
        };
        let mut segments = channel.split('.');
        let (Some("market"), Some(symbol)) = (segments.next(), segments.next()) else {
            return Ok(Parsed::empty());
        };
        let topic: Vec<&str> = segments.collect();
        let tick = value.get("tick").ok_or_else(|| FeedError::Parse {
            exchange: EXCHANGE,
            detail: format!("channel '{channel}' without tick"),
        })?;
        let frame_ts = value.get("ts").and_then(Value::as_u64);

        match topic.as_slice() {
            ["trade", "detail"] => match subs.market_for(StreamKind::Trades, symbol) {
                Some(market) => trade_events(tick, market),
                None => Ok(Parsed::empty()),
            },
            ["depth", _] => match subs.market_for(StreamKind::Level2Snapshots, symbol) {
                Some(market) => depth_event(tick, frame_ts, market),
                None => Ok(Parsed::empty()),
            },
            ["detail"] => match subs.market_for(StreamKind::Ticker, symbol) {
                Some(market) => ticker_event(tick, frame_ts, market),
                None => Ok(Parsed::empty()),
            },
            _ => Ok(Parsed::empty()),
        }
    }

    fn compression(&self) -> Option<Compression> {
        Some(Compression::Gzip)
    }
}

/// Huobi sends numbers, not strings; render them losslessly.
fn num_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn trade_events(tick: &Value, market: &Market) -> Result<Parsed, FeedError> {
    let rows = tick
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| FeedError::Parse {
            exchange: EXCHANGE,
            detail: "trade tick without data".into(),
        })?;

    let mut parsed = Parsed::empty();
    for row in rows {
        let side = match row.get("direction").and_then(Value::as_str) {
            Some("buy") => Side::Buy,
            _ => Side::Sell,
        };
        let trade = Trade::new(
            EXCHANGE,
            market.base.clone(),
            market.quote.clone(),
            row.get("tradeId")
                .or_else(|| row.get("id"))
                .map(num_string)
                .unwrap_or_default(),
            row.get("ts").and_then(Value::as_u64).unwrap_or(0),
            side,
            row.get("price").map(num_string).unwrap_or_default(),
            row.get("amount").map(num_string).unwrap_or_default(),
        );
        parsed.events.push((MarketEvent::Trade(trade), market.clone()));
    }
    Ok(parsed)
}

fn depth_points(tick: &Value, key: &str) -> Vec<Level2Point> {
    tick.get(key)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let price = row.get(0)?;
                    let size = row.get(1)?;
                    Some(Level2Point::new(num_string(price), num_string(size)))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn depth_event(tick: &Value, frame_ts: Option<u64>, market: &Market) -> Result<Parsed, FeedError> {
    let snapshot = Level2Snapshot {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        sequence_id: tick.get("version").and_then(Value::as_u64),
        timestamp_ms: tick.get("ts").and_then(Value::as_u64).or(frame_ts),
        asks: depth_points(tick, "asks"),
        bids: depth_points(tick, "bids"),
    };
    Ok(Parsed::event(
        MarketEvent::Level2Snapshot(snapshot),
        market.clone(),
    ))
}

fn ticker_event(tick: &Value, frame_ts: Option<u64>, market: &Market) -> Result<Parsed, FeedError> {
    let last = tick.get("close").map(num_string).ok_or_else(|| FeedError::Parse {
        exchange: EXCHANGE,
        detail: "detail tick without close".into(),
    })?;
    let ticker = Ticker {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        timestamp_ms: frame_ts.unwrap_or(0),
        last,
        open: tick.get("open").map(num_string),
        high: tick.get("high").map(num_string),
        low: tick.get("low").map(num_string),
        volume: tick.get("amount").map(num_string),
        quote_volume: tick.get("vol").map(num_string),
        change: None,
        change_percent: None,
        bid: None,
        bid_volume: None,
        ask: None,
        ask_volume: None,
    };
    Ok(Parsed::event(MarketEvent::Ticker(ticker), market.clone()))
}
