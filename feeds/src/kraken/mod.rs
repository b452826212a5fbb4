//! Kraken adapter
//!
//! Channel subscriptions go out as event objects; data comes back as
//! JSON arrays `[channelId, data..., channelName, pair]`. The book
//! channel opens with a full snapshot (`as`/`bs`) and follows with diffs
//! (`a`/`b`) carrying a `c` checksum of the resulting top levels — the
//! checksum is surfaced on every update so a
//! [`Level2Book`](lob::Level2Book) can be verified against it.

use crate::common::adapter::{
    Adapter, BatchLimits, Capabilities, ClientConfig, Parsed, StreamKind,
};
use crate::common::client::{BaseClient, SubscriptionMaps};
use crate::common::error::FeedError;
use crate::common::event::{ClientEvent, MarketEvent};
use common::{Candle, Level2Point, Level2Snapshot, Level2Update, Market, Side, Ticker, Trade};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Public WebSocket endpoint.
pub const WS_URL: &str = "wss://ws.kraken.com";

const EXCHANGE: &str = "kraken";
const BOOK_DEPTH: u32 = 10;

/// Create a Kraken client with default options.
pub fn client() -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    client_with(ClientConfig::new(WS_URL))
}

/// Create a Kraken client with custom options.
pub fn client_with(config: ClientConfig) -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    BaseClient::new(KrakenAdapter::new(), config)
}

/// Wire translation for Kraken's public channels.
pub struct KrakenAdapter;

impl KrakenAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn subscription(kind: StreamKind) -> Option<Value> {
        match kind {
            StreamKind::Ticker => Some(serde_json::json!({"name": "ticker"})),
            StreamKind::Trades => Some(serde_json::json!({"name": "trade"})),
            StreamKind::Candles => Some(serde_json::json!({"name": "ohlc", "interval": 1})),
            StreamKind::Level2Updates => {
                Some(serde_json::json!({"name": "book", "depth": BOOK_DEPTH}))
            }
            _ => None,
        }
    }

    fn frame(event: &str, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        let Some(subscription) = Self::subscription(kind) else {
            return Vec::new();
        };
        vec![
            serde_json::json!({
                "event": event,
                "pair": remote_ids,
                "subscription": subscription,
            })
            .to_string(),
        ]
    }
}

impl Default for KrakenAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for KrakenAdapter {
    fn exchange(&self) -> &'static str {
        EXCHANGE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tickers: true,
            trades: true,
            candles: true,
            level2_updates: true,
            ..Capabilities::default()
        }
    }

    fn subscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        Self::frame("subscribe", kind, remote_ids)
    }

    fn unsubscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        Self::frame("unsubscribe", kind, remote_ids)
    }

    fn parse(&mut self, raw: &str, subs: &SubscriptionMaps) -> Result<Parsed, FeedError> {
        let value: Value = serde_json::from_str(raw)?;

        // Objects are status traffic: heartbeat, systemStatus,
        // subscriptionStatus. Nothing to emit.
        let Value::Array(parts) = value else {
            return Ok(Parsed::empty());
        };
        if parts.len() < 4 {
            return Err(FeedError::Parse {
                exchange: EXCHANGE,
                detail: format!("array frame with {} elements", parts.len()),
            });
        }

        let channel = parts[parts.len() - 2].as_str().unwrap_or_default();
        let pair = parts[parts.len() - 1].as_str().unwrap_or_default();
        let payloads = &parts[1..parts.len() - 2];

        if channel == "ticker" {
            match subs.market_for(StreamKind::Ticker, pair) {
                Some(market) => ticker_event(&payloads[0], market),
                None => Ok(Parsed::empty()),
            }
        } else if channel == "trade" {
            match subs.market_for(StreamKind::Trades, pair) {
                Some(market) => trade_events(&payloads[0], market),
                None => Ok(Parsed::empty()),
            }
        } else if channel.starts_with("ohlc") {
            match subs.market_for(StreamKind::Candles, pair) {
                Some(market) => candle_event(&payloads[0], market),
                None => Ok(Parsed::empty()),
            }
        } else if channel.starts_with("book") {
            match subs.market_for(StreamKind::Level2Updates, pair) {
                Some(market) => book_events(payloads, market),
                None => Ok(Parsed::empty()),
            }
        } else {
            Ok(Parsed::empty())
        }
    }

    fn subscribe_batch(&self) -> Option<BatchLimits> {
        Some(BatchLimits {
            max_per_frame: 20,
            collect: Duration::ZERO,
        })
    }
}

fn str_at<'a>(value: &'a Value, idx: usize) -> Result<&'a str, FeedError> {
    value
        .get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::Parse {
            exchange: EXCHANGE,
            detail: format!("missing string at index {idx}"),
        })
}

fn time_ms(raw: &str) -> u64 {
    raw.parse::<f64>().map_or(0, |secs| (secs * 1000.0) as u64)
}

fn ticker_event(payload: &Value, market: &Market) -> Result<Parsed, FeedError> {
    let field = |key: &str, idx: usize| -> Option<String> {
        payload
            .get(key)
            .and_then(|v| v.get(idx))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let last = field("c", 0).ok_or_else(|| FeedError::Parse {
        exchange: EXCHANGE,
        detail: "ticker without last price".into(),
    })?;

    // The ticker payload carries no timestamp; stamp with receive time.
    let received_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
    let ticker = Ticker {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        timestamp_ms: received_ms,
        last,
        open: field("o", 1),
        high: field("h", 1),
        low: field("l", 1),
        volume: field("v", 1),
        quote_volume: None,
        change: None,
        change_percent: None,
        bid: field("b", 0),
        bid_volume: field("b", 2),
        ask: field("a", 0),
        ask_volume: field("a", 2),
    };
    Ok(Parsed::event(MarketEvent::Ticker(ticker), market.clone()))
}

fn trade_events(payload: &Value, market: &Market) -> Result<Parsed, FeedError> {
    let rows = payload.as_array().ok_or_else(|| FeedError::Parse {
        exchange: EXCHANGE,
        detail: "trade payload is not an array".into(),
    })?;

    let mut parsed = Parsed::empty();
    for row in rows {
        let price = str_at(row, 0)?;
        let amount = str_at(row, 1)?;
        let time = str_at(row, 2)?;
        let side = match str_at(row, 3)? {
            "b" => Side::Buy,
            _ => Side::Sell,
        };
        let unix_ms = time_ms(time);
        let trade = Trade::new(
            EXCHANGE,
            market.base.clone(),
            market.quote.clone(),
            // Kraken publishes no trade id; the microsecond timestamp is
            // the closest unique handle.
            time.replace('.', ""),
            unix_ms,
            side,
            price,
            amount,
        );
        parsed.events.push((MarketEvent::Trade(trade), market.clone()));
    }
    Ok(parsed)
}

fn candle_event(payload: &Value, market: &Market) -> Result<Parsed, FeedError> {
    let candle = Candle {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        timestamp_ms: time_ms(str_at(payload, 0)?),
        open: str_at(payload, 2)?.to_string(),
        high: str_at(payload, 3)?.to_string(),
        low: str_at(payload, 4)?.to_string(),
        close: str_at(payload, 5)?.to_string(),
        volume: str_at(payload, 7)?.to_string(),
    };
    Ok(Parsed::event(MarketEvent::Candle(candle), market.clone()))
}

fn level_points(payload: &Value, key: &str) -> Vec<Level2Point> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let price = row.get(0)?.as_str()?;
                    let size = row.get(1)?.as_str()?;
                    Some(Level2Point::new(price, size))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A book frame is a snapshot (`as`/`bs`) or one-to-two diff dicts
/// (`a`/`b`, last one possibly carrying the `c` checksum).
fn book_events(payloads: &[Value], market: &Market) -> Result<Parsed, FeedError> {
    let first = payloads.first().ok_or_else(|| FeedError::Parse {
        exchange: EXCHANGE,
        detail: "book frame without payload".into(),
    })?;

    if first.get("as").is_some() || first.get("bs").is_some() {
        let snapshot = Level2Snapshot {
            exchange: EXCHANGE.into(),
            base: market.base.clone(),
            quote: market.quote.clone(),
            sequence_id: None,
            timestamp_ms: None,
            asks: level_points(first, "as"),
            bids: level_points(first, "bs"),
        };
        return Ok(Parsed::event(
            MarketEvent::Level2Snapshot(snapshot),
            market.clone(),
        ));
    }

    let mut asks = Vec::new();
    let mut bids = Vec::new();
    let mut checksum = None;
    for payload in payloads {
        asks.extend(level_points(payload, "a"));
        bids.extend(level_points(payload, "b"));
        if let Some(c) = payload.get("c").and_then(Value::as_str) {
            checksum = c.parse::<u32>().ok();
        }
    }

    let update = Level2Update {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        sequence_id: None,
        first_sequence_id: None,
        timestamp_ms: None,
        asks,
        bids,
        checksum,
    };
    Ok(Parsed::event(MarketEvent::Level2Update(update), market.clone()))
}
