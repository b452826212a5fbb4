//! Coinbase Exchange adapter
//!
//! The `full` channel is an order-granular (level 3) feed: `open`,
//! `done`, `match` and `change` messages keyed by order id, each mapped
//! onto a typed [`L3Action`] point for the
//! [`Level3Book`](lob::Level3Book). `match` doubles as the trade tape,
//! so one wire message can fan out to both a trade and a level-3 diff
//! depending on what is subscribed.

use crate::common::adapter::{Adapter, Capabilities, ClientConfig, Parsed, StreamKind};
use crate::common::client::{BaseClient, SubscriptionMaps};
use crate::common::error::FeedError;
use crate::common::event::{ClientEvent, MarketEvent};
use common::{L3Action, Level3Point, Level3Update, Market, Side, Ticker, Trade};
use serde::Deserialize;
use tokio::sync::mpsc;

/// Public WebSocket endpoint.
pub const WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

const EXCHANGE: &str = "coinbase";

/// Create a Coinbase client with default options.
pub fn client() -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    client_with(ClientConfig::new(WS_URL))
}

/// Create a Coinbase client with custom options.
pub fn client_with(config: ClientConfig) -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
    BaseClient::new(CoinbaseAdapter::new(), config)
}

/// Wire translation for the Coinbase `ticker`, `matches` and `full`
/// channels.
pub struct CoinbaseAdapter;

impl CoinbaseAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn channel(kind: StreamKind) -> Option<&'static str> {
        match kind {
            StreamKind::Ticker => Some("ticker"),
            StreamKind::Trades => Some("matches"),
            StreamKind::Level3Updates => Some("full"),
            _ => None,
        }
    }

    fn frame(event: &str, kind: StreamKind, remote_ids: &[String]) -> Vec<String> {
        let Some(channel) = Self::channel(kind) else {
            return Vec::new();
        };
        vec![
            serde_json::json!({
                "type": event,
                "product_ids": remote_ids,
                "channels": [channel],
            })
            .to_string(),
        ]
    }
}

impl Default for CoinbaseAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for CoinbaseAdapter {
    fn exchange(&self) -> &'static str {
        EXCHANGE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tickers: true,
            trades: true,
            level3_updates: true,
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
        let msg: FullMsg = serde_json::from_str(raw)?;
        let mut parsed = Parsed::empty();

        match msg.kind.as_str() {
            "ticker" => {
                if let Some(market) = subs.market_for(StreamKind::Ticker, &msg.product_id) {
                    parsed
                        .events
                        .push((MarketEvent::Ticker(ticker_from(&msg, market)?), market.clone()));
                }
            }
            "match" | "last_match" => {
                if let Some(market) = subs.market_for(StreamKind::Trades, &msg.product_id) {
                    parsed
                        .events
                        .push((MarketEvent::Trade(trade_from(&msg, market)?), market.clone()));
                }
                if let Some(market) = subs.market_for(StreamKind::Level3Updates, &msg.product_id)
                {
                    if let Some(update) = match_update(&msg, market)? {
                        parsed
                            .events
                            .push((MarketEvent::Level3Update(update), market.clone()));
                    }
                }
            }
            "open" | "done" | "change" => {
                if let Some(market) = subs.market_for(StreamKind::Level3Updates, &msg.product_id)
                {
                    if let Some(update) = order_update(&msg, market)? {
                        parsed
                            .events
                            .push((MarketEvent::Level3Update(update), market.clone()));
                    }
                }
            }
            // "received", "subscriptions", "heartbeat", "activate" carry
            // nothing a book or tape needs.
            _ => {}
        }
        Ok(parsed)
    }
}

fn time_ms(raw: Option<&str>) -> Option<u64> {
    let parsed = chrono::DateTime::parse_from_rfc3339(raw?).ok()?;
    u64::try_from(parsed.timestamp_millis()).ok()
}

fn require<'a>(field: Option<&'a str>, name: &str) -> Result<&'a str, FeedError> {
    field.ok_or_else(|| FeedError::Parse {
        exchange: EXCHANGE,
        detail: format!("message missing '{name}'"),
    })
}

fn ticker_from(msg: &FullMsg, market: &Market) -> Result<Ticker, FeedError> {
    Ok(Ticker {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        timestamp_ms: time_ms(msg.time.as_deref()).unwrap_or(0),
        last: require(msg.price.as_deref(), "price")?.to_string(),
        open: msg.open_24h.clone(),
        high: msg.high_24h.clone(),
        low: msg.low_24h.clone(),
        volume: msg.volume_24h.clone(),
        quote_volume: None,
        change: None,
        change_percent: None,
        bid: msg.best_bid.clone(),
        bid_volume: msg.best_bid_size.clone(),
        ask: msg.best_ask.clone(),
        ask_volume: msg.best_ask_size.clone(),
    })
}

fn trade_from(msg: &FullMsg, market: &Market) -> Result<Trade, FeedError> {
    // `side` is the maker order's side; the taker took the other one.
    let maker_side = require(msg.side.as_deref(), "side")?;
    let taker_side = if maker_side == "buy" {
        Side::Sell
    } else {
        Side::Buy
    };
    let (buy_order_id, sell_order_id) = if maker_side == "buy" {
        (msg.maker_order_id.clone(), msg.taker_order_id.clone())
    } else {
        (msg.taker_order_id.clone(), msg.maker_order_id.clone())
    };

    let mut trade = Trade::new(
        EXCHANGE,
        market.base.clone(),
        market.quote.clone(),
        msg.trade_id.map_or_else(String::new, |id| id.to_string()),
        time_ms(msg.time.as_deref()).unwrap_or(0),
        taker_side,
        require(msg.price.as_deref(), "price")?.to_string(),
        require(msg.size.as_deref(), "size")?.to_string(),
    );
    trade.buy_order_id = buy_order_id;
    trade.sell_order_id = sell_order_id;
    Ok(trade)
}

fn sided_update(
    msg: &FullMsg,
    market: &Market,
    side: &str,
    point: Level3Point,
) -> Level3Update {
    let (asks, bids) = if side == "buy" {
        (Vec::new(), vec![point])
    } else {
        (vec![point], Vec::new())
    };
    Level3Update {
        exchange: EXCHANGE.into(),
        base: market.base.clone(),
        quote: market.quote.clone(),
        sequence_id: msg.sequence,
        timestamp_ms: time_ms(msg.time.as_deref()),
        asks,
        bids,
    }
}

fn order_update(msg: &FullMsg, market: &Market) -> Result<Option<Level3Update>, FeedError> {
    let side = require(msg.side.as_deref(), "side")?.to_string();
    let order_id = require(msg.order_id.as_deref(), "order_id")?;

    let point = match msg.kind.as_str() {
        "open" => Level3Point {
            order_id: order_id.to_string(),
            price: require(msg.price.as_deref(), "price")?.to_string(),
            size: require(msg.remaining_size.as_deref(), "remaining_size")?.to_string(),
            timestamp_ms: time_ms(msg.time.as_deref()),
            action: Some(L3Action::Open),
        },
        "done" => Level3Point {
            order_id: order_id.to_string(),
            // Market orders finish without ever resting; price may be
            // absent and the book only needs the id to drop it.
            price: msg.price.clone().unwrap_or_default(),
            size: msg.remaining_size.clone().unwrap_or_default(),
            timestamp_ms: time_ms(msg.time.as_deref()),
            action: Some(L3Action::Done),
        },
        "change" => Level3Point {
            order_id: order_id.to_string(),
            price: msg.price.clone().unwrap_or_default(),
            size: require(msg.new_size.as_deref(), "new_size")?.to_string(),
            timestamp_ms: time_ms(msg.time.as_deref()),
            action: Some(L3Action::Change),
        },
        _ => return Ok(None),
    };
    Ok(Some(sided_update(msg, market, &side, point)))
}

/// A match reduces the resting (maker) order.
fn match_update(msg: &FullMsg, market: &Market) -> Result<Option<Level3Update>, FeedError> {
    let Some(maker_order_id) = msg.maker_order_id.clone() else {
        return Ok(None);
    };
    let side = require(msg.side.as_deref(), "side")?.to_string();
    let point = Level3Point {
        order_id: maker_order_id,
        price: msg.price.clone().unwrap_or_default(),
        size: require(msg.size.as_deref(), "size")?.to_string(),
        timestamp_ms: time_ms(msg.time.as_deref()),
        action: Some(L3Action::Match),
    };
    Ok(Some(sided_update(msg, market, &side, point)))
}

/// Superset of every full-channel message shape.
#[derive(Debug, Deserialize)]
struct FullMsg {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    product_id: String,
    sequence: Option<u64>,
    time: Option<String>,
    price: Option<String>,
    size: Option<String>,
    side: Option<String>,
    order_id: Option<String>,
    remaining_size: Option<String>,
    new_size: Option<String>,
    trade_id: Option<u64>,
    maker_order_id: Option<String>,
    taker_order_id: Option<String>,
    open_24h: Option<String>,
    high_24h: Option<String>,
    low_24h: Option<String>,
    volume_24h: Option<String>,
    best_bid: Option<String>,
    best_bid_size: Option<String>,
    best_ask: Option<String>,
    best_ask_size: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs_with(kind: StreamKind, id: &str) -> SubscriptionMaps {
        let mut subs = SubscriptionMaps::default();
        let market = Market::new(id, "BTC", "USD");
        subs.map_mut(kind).insert(market.id.clone(), market);
        subs
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let mut adapter = CoinbaseAdapter::new();
        let frames =
            adapter.subscribe_frames(StreamKind::Level3Updates, &["BTC-USD".to_string()]);
        let frame: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(frame["type"], "subscribe");
        assert_eq!(frame["product_ids"][0], "BTC-USD");
        assert_eq!(frame["channels"][0], "full");
    }

    #[test]
    fn test_parse_open_routes_to_bids() {
        let mut adapter = CoinbaseAdapter::new();
        let subs = subs_with(StreamKind::Level3Updates, "BTC-USD");
        let raw = r#"{"type":"open","time":"2024-01-23T10:00:00.000000Z","product_id":"BTC-USD","sequence":10,"order_id":"d50ec984-77a8-460a-b958-66f114b0de9b","price":"40000.00","remaining_size":"1.00","side":"buy"}"#;

        let parsed = adapter.parse(raw, &subs).unwrap();
        match &parsed.events[0].0 {
            MarketEvent::Level3Update(update) => {
                assert!(update.asks.is_empty());
                let point = &update.bids[0];
                assert_eq!(point.order_id, "d50ec984-77a8-460a-b958-66f114b0de9b");
                assert_eq!(point.action, Some(L3Action::Open));
                assert_eq!(update.sequence_id, Some(10));
            }
            other => panic!("expected l3 update, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_done_without_price() {
        let mut adapter = CoinbaseAdapter::new();
        let subs = subs_with(StreamKind::Level3Updates, "BTC-USD");
        let raw = r#"{"type":"done","time":"2024-01-23T10:00:01.000000Z","product_id":"BTC-USD","sequence":11,"order_id":"d50ec984-77a8-460a-b958-66f114b0de9b","reason":"canceled","side":"sell"}"#;

        let parsed = adapter.parse(raw, &subs).unwrap();
        match &parsed.events[0].0 {
            MarketEvent::Level3Update(update) => {
                assert_eq!(update.asks[0].action, Some(L3Action::Done));
            }
            other => panic!("expected l3 update, got {other:?}"),
        }
    }

    #[test]
    fn test_match_fans_out_to_trade_and_l3() {
        let mut adapter = CoinbaseAdapter::new();
        let mut subs = subs_with(StreamKind::Trades, "BTC-USD");
        let market = Market::new("BTC-USD", "BTC", "USD");
        subs.map_mut(StreamKind::Level3Updates)
            .insert(market.id.clone(), market);

        let raw = r#"{"type":"match","trade_id":10,"sequence":50,"maker_order_id":"ac928c66-ca53-498f-9c13-a110027a60e8","taker_order_id":"132fb6ae-456b-4654-b4e0-d681ac05cea1","time":"2014-11-07T08:19:27.028459Z","product_id":"BTC-USD","size":"5.23512","price":"400.23","side":"sell"}"#;

        let parsed = adapter.parse(raw, &subs).unwrap();
        assert_eq!(parsed.events.len(), 2);

        match &parsed.events[0].0 {
            MarketEvent::Trade(trade) => {
                // Maker sold, so the taker bought.
                assert_eq!(trade.side, Side::Buy);
                assert_eq!(trade.trade_id, "10");
                assert_eq!(trade.sell_order_id.as_deref(), Some("ac928c66-ca53-498f-9c13-a110027a60e8"));
            }
            other => panic!("expected trade, got {other:?}"),
        }
        match &parsed.events[1].0 {
            MarketEvent::Level3Update(update) => {
                let point = &update.asks[0];
                assert_eq!(point.action, Some(L3Action::Match));
                assert_eq!(point.order_id, "ac928c66-ca53-498f-9c13-a110027a60e8");
                assert_eq!(point.size, "5.23512");
            }
            other => panic!("expected l3 update, got {other:?}"),
        }
    }

    #[test]
    fn test_received_is_ignored() {
        let mut adapter = CoinbaseAdapter::new();
        let subs = subs_with(StreamKind::Level3Updates, "BTC-USD");
        let raw = r#"{"type":"received","time":"2014-11-07T08:19:27.028459Z","product_id":"BTC-USD","sequence":12,"order_id":"x","size":"1.34","price":"502.1","side":"buy","order_type":"limit"}"#;
        let parsed = adapter.parse(raw, &subs).unwrap();
        assert!(parsed.events.is_empty());
    }

    #[test]
    fn test_ticker() {
        let mut adapter = CoinbaseAdapter::new();
        let subs = subs_with(StreamKind::Ticker, "BTC-USD");
        let raw = r#"{"type":"ticker","sequence":100,"product_id":"BTC-USD","price":"40001.50","open_24h":"39000.00","volume_24h":"1000.5","low_24h":"38500.00","high_24h":"40500.00","best_bid":"40001.00","best_bid_size":"0.5","best_ask":"40002.00","best_ask_size":"0.7","side":"buy","time":"2024-01-23T10:00:00.000000Z","trade_id":999,"last_size":"0.01"}"#;

        let parsed = adapter.parse(raw, &subs).unwrap();
        match &parsed.events[0].0 {
            MarketEvent::Ticker(ticker) => {
                assert_eq!(ticker.last, "40001.50");
                assert_eq!(ticker.bid.as_deref(), Some("40001.00"));
                assert_eq!(ticker.timestamp_ms, 1_706_004_000_000);
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }
}
