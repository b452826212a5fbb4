//! The contract between the generic client and an exchange module

use crate::common::client::SubscriptionMaps;
use crate::common::error::FeedError;
use crate::common::event::MarketEvent;
use common::Market;
use flow::CodecOp;
use std::time::Duration;

/// Stream types a client can subscribe to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StreamKind {
    /// 24h ticker stream
    Ticker,
    /// Trade (tape) stream
    Trades,
    /// OHLCV candle stream
    Candles,
    /// Full level-2 snapshot stream
    Level2Snapshots,
    /// Incremental level-2 diff stream
    Level2Updates,
    /// Full level-3 snapshot stream
    Level3Snapshots,
    /// Incremental level-3 diff stream
    Level3Updates,
}

impl StreamKind {
    /// Every stream kind, in a fixed order (used for resubscribe sweeps).
    pub const ALL: [Self; 7] = [
        Self::Ticker,
        Self::Trades,
        Self::Candles,
        Self::Level2Snapshots,
        Self::Level2Updates,
        Self::Level3Snapshots,
        Self::Level3Updates,
    ];
}

/// Which stream kinds an exchange module supports.
///
/// Set once in the adapter constructor. Subscribing to an unsupported
/// kind is a silent no-op on the client — callers are expected to check,
/// but the API tolerates not doing so.
#[derive(Clone, Copy, Debug, Default)]
pub struct Capabilities {
    /// Supports ticker streams
    pub tickers: bool,
    /// Supports trade streams
    pub trades: bool,
    /// Supports candle streams
    pub candles: bool,
    /// Supports level-2 snapshot streams
    pub level2_snapshots: bool,
    /// Supports level-2 diff streams
    pub level2_updates: bool,
    /// Supports level-3 snapshot streams
    pub level3_snapshots: bool,
    /// Supports level-3 diff streams
    pub level3_updates: bool,
}

impl Capabilities {
    /// Whether `kind` is supported.
    #[must_use]
    pub fn supports(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Ticker => self.tickers,
            StreamKind::Trades => self.trades,
            StreamKind::Candles => self.candles,
            StreamKind::Level2Snapshots => self.level2_snapshots,
            StreamKind::Level2Updates => self.level2_updates,
            StreamKind::Level3Snapshots => self.level3_snapshots,
            StreamKind::Level3Updates => self.level3_updates,
        }
    }
}

/// Frame compression an exchange applies to its payloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    /// gzip members (RFC 1952)
    Gzip,
    /// zlib streams (RFC 1950)
    Zlib,
    /// raw DEFLATE streams (RFC 1951)
    DeflateRaw,
}

impl Compression {
    /// The codec operation that undoes this compression.
    #[must_use]
    pub fn op(self) -> CodecOp {
        match self {
            Self::Gzip => CodecOp::Gunzip,
            Self::Zlib => CodecOp::Inflate,
            Self::DeflateRaw => CodecOp::InflateRaw,
        }
    }
}

/// Limits for coalescing subscribe calls into shared wire frames.
#[derive(Clone, Copy, Debug)]
pub struct BatchLimits {
    /// Maximum markets per wire frame
    pub max_per_frame: usize,
    /// How long to collect before flushing
    pub collect: Duration,
}

/// Result of parsing one inbound frame.
#[derive(Debug, Default)]
pub struct Parsed {
    /// Normalized events, each tagged with its originating market
    pub events: Vec<(MarketEvent, Market)>,
    /// Protocol replies the client must send back (heartbeat pongs etc.)
    pub replies: Vec<String>,
}

impl Parsed {
    /// A parse result with no events and no replies.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A parse result carrying a single event.
    #[must_use]
    pub fn event(event: MarketEvent, market: Market) -> Self {
        Self {
            events: vec![(event, market)],
            replies: Vec::new(),
        }
    }

    /// A parse result carrying a single protocol reply.
    #[must_use]
    pub fn reply(frame: String) -> Self {
        Self {
            events: Vec::new(),
            replies: vec![frame],
        }
    }
}

/// Wire-format translation implemented by each exchange module.
///
/// Everything stateful about a connection — subscription maps, socket
/// lifecycle, resubscribe on reconnect — lives in
/// [`BaseClient`](crate::BaseClient); an adapter only renders subscribe
/// frames and parses inbound ones. Frames must be idempotent: the client
/// replays them verbatim after every reconnect.
pub trait Adapter: Send + 'static {
    /// Exchange identifier stamped on every event, e.g. `"kraken"`.
    fn exchange(&self) -> &'static str;

    /// Stream kinds this adapter supports.
    fn capabilities(&self) -> Capabilities;

    /// Wire frames subscribing `remote_ids` to `kind`.
    ///
    /// Returns no frames when the kind is unsupported. May be called with
    /// many ids at once (reconnect sweep, batched subscribes); adapters
    /// decide how many ids share one frame.
    fn subscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String>;

    /// Wire frames unsubscribing `remote_ids` from `kind`.
    fn unsubscribe_frames(&mut self, kind: StreamKind, remote_ids: &[String]) -> Vec<String>;

    /// Parse one inbound text frame.
    ///
    /// The subscription maps are read-only context for routing: an event
    /// whose market is no longer subscribed is silently discarded (a late
    /// message racing an unsubscribe is normal, not an error).
    fn parse(&mut self, raw: &str, subs: &SubscriptionMaps) -> Result<Parsed, FeedError>;

    /// Compression applied to binary frames, if any.
    fn compression(&self) -> Option<Compression> {
        None
    }

    /// Subscribe-coalescing limits, if the venue caps items per message.
    fn subscribe_batch(&self) -> Option<BatchLimits> {
        None
    }
}

/// Per-connection client options.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket endpoint to connect to
    pub ws_url: String,
    /// Fixed delay before each reconnect attempt
    pub retry_delay: Duration,
    /// Upper bound of the random jitter added to each retry delay
    pub retry_jitter: Duration,
    /// Liveness watchdog interval; `None` disables the watchdog
    pub watch_interval: Option<Duration>,
    /// Minimum spacing between socket cycles from reconnect requests
    pub reconnect_throttle: Duration,
}

impl ClientConfig {
    /// Defaults for `ws_url`: 15s retry with up to 2s jitter, 90s
    /// liveness watchdog, 5s reconnect throttle.
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            retry_delay: Duration::from_secs(15),
            retry_jitter: Duration::from_secs(2),
            watch_interval: Some(Duration::from_secs(90)),
            reconnect_throttle: Duration::from_secs(5),
        }
    }

    /// Override the retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Override the retry jitter bound (zero disables jitter).
    #[must_use]
    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Override or disable the liveness watchdog.
    #[must_use]
    pub fn with_watch_interval(mut self, interval: Option<Duration>) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Override the reconnect throttle window.
    #[must_use]
    pub fn with_reconnect_throttle(mut self, window: Duration) -> Self {
        self.reconnect_throttle = window;
        self
    }
}
