//! Generic per-connection client state machine

use crate::common::adapter::{Adapter, ClientConfig, StreamKind};
use crate::common::event::{ClientEvent, MarketEvent};
use crate::common::socket::{ResilientSocket, SocketConfig, SocketEvent};
use crate::common::watcher::LivenessWatcher;
use common::Market;
use flow::{Batch, SerializedCodec, Throttle};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

/// The seven per-connection subscription maps, keyed by remote id.
///
/// Presence in a map means "currently subscribed". The maps are the
/// source of truth for the resubscribe sweep after a reconnect — they
/// are never cleared by connection loss, only by an explicit close.
#[derive(Debug, Default)]
pub struct SubscriptionMaps {
    ticker: FxHashMap<String, Market>,
    trades: FxHashMap<String, Market>,
    candles: FxHashMap<String, Market>,
    level2_snapshots: FxHashMap<String, Market>,
    level2_updates: FxHashMap<String, Market>,
    level3_snapshots: FxHashMap<String, Market>,
    level3_updates: FxHashMap<String, Market>,
}

impl SubscriptionMaps {
    /// The map for `kind`.
    #[must_use]
    pub fn map(&self, kind: StreamKind) -> &FxHashMap<String, Market> {
        match kind {
            StreamKind::Ticker => &self.ticker,
            StreamKind::Trades => &self.trades,
            StreamKind::Candles => &self.candles,
            StreamKind::Level2Snapshots => &self.level2_snapshots,
            StreamKind::Level2Updates => &self.level2_updates,
            StreamKind::Level3Snapshots => &self.level3_snapshots,
            StreamKind::Level3Updates => &self.level3_updates,
        }
    }

    pub(crate) fn map_mut(&mut self, kind: StreamKind) -> &mut FxHashMap<String, Market> {
        match kind {
            StreamKind::Ticker => &mut self.ticker,
            StreamKind::Trades => &mut self.trades,
            StreamKind::Candles => &mut self.candles,
            StreamKind::Level2Snapshots => &mut self.level2_snapshots,
            StreamKind::Level2Updates => &mut self.level2_updates,
            StreamKind::Level3Snapshots => &mut self.level3_snapshots,
            StreamKind::Level3Updates => &mut self.level3_updates,
        }
    }

    /// The market subscribed under `remote_id` for `kind`, if any.
    ///
    /// Adapters use this to route parsed messages; `None` means the
    /// message raced an unsubscribe and should be discarded silently.
    #[must_use]
    pub fn market_for(&self, kind: StreamKind, remote_id: &str) -> Option<&Market> {
        self.map(kind).get(remote_id)
    }

    /// Total number of active subscriptions across every kind.
    #[must_use]
    pub fn total(&self) -> usize {
        StreamKind::ALL.iter().map(|k| self.map(*k).len()).sum()
    }

    fn clear(&mut self) {
        for kind in StreamKind::ALL {
            self.map_mut(kind).clear();
        }
    }
}

enum Cmd {
    Subscribe { kind: StreamKind, market: Market },
    Unsubscribe { kind: StreamKind, market: Market },
    Reconnect,
    Close,
}

/// Work the client schedules for itself through the flow combinators.
enum Internal {
    CycleSocket,
    FlushSubs(Vec<(StreamKind, String)>),
}

/// Handle to a per-connection client task.
///
/// One exchange connection, one task: all subscription bookkeeping,
/// message parsing, and event emission happen inside that task, so no
/// two operations on one client ever overlap. The handle just forwards
/// commands; every method returns once the request is queued, not once
/// the exchange confirms it.
///
/// Subscribe calls are idempotent, lazily open the connection on first
/// use, and are silent no-ops for stream kinds the adapter does not
/// support. After any reconnect the client replays every active
/// subscription itself — consumers never resubscribe.
#[derive(Clone)]
pub struct BaseClient {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    exchange: &'static str,
}

impl BaseClient {
    /// Spawn a client over a fresh [`ResilientSocket`].
    pub fn new<A: Adapter + Sync>(
        adapter: A,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let socket_config = SocketConfig::new(config.ws_url.clone())
            .with_retry_delay(config.retry_delay)
            .with_retry_jitter(config.retry_jitter);
        let (socket, socket_events) = ResilientSocket::spawn(socket_config);
        Self::with_socket(adapter, config, socket, socket_events)
    }

    /// Spawn a client over an existing socket handle and event stream.
    ///
    /// The seam for custom transports and scripted tests: whoever holds
    /// the other end of the channels plays the socket.
    pub fn with_socket<A: Adapter + Sync>(
        adapter: A,
        config: ClientConfig,
        socket: ResilientSocket,
        socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let exchange = adapter.exchange();

        // The combinators feed a channel of their own: were they to hold
        // the public command sender, the command channel could never
        // close and a dropped client would leak its task and socket.
        let gate_tx = internal_tx.clone();
        let reconnect_gate = Throttle::new(config.reconnect_throttle, move |()| {
            let _ = gate_tx.send(Internal::CycleSocket);
        });

        let sub_batch = adapter.subscribe_batch().map(|limits| {
            let flush_tx = internal_tx.clone();
            Batch::new(limits.max_per_frame, limits.collect, move |chunk| {
                let _ = flush_tx.send(Internal::FlushSubs(chunk));
            })
        });

        let codec = adapter.compression().map(|_| SerializedCodec::new());
        let watcher = config.watch_interval.map(LivenessWatcher::new);

        let task = ClientTask {
            adapter,
            subs: SubscriptionMaps::default(),
            socket,
            events: event_tx,
            watcher,
            codec,
            sub_batch,
            reconnect_gate,
            connected: false,
            started: false,
            closing: false,
        };
        tokio::spawn(task.run(cmd_rx, internal_rx, socket_events));

        (Self { cmd_tx, exchange }, event_rx)
    }

    /// Exchange identifier this client speaks to.
    #[must_use]
    pub fn exchange(&self) -> &'static str {
        self.exchange
    }

    fn send(&self, cmd: Cmd) {
        let _ = self.cmd_tx.send(cmd);
    }

    fn subscribe(&self, kind: StreamKind, market: &Market) {
        self.send(Cmd::Subscribe {
            kind,
            market: market.clone(),
        });
    }

    fn unsubscribe(&self, kind: StreamKind, market: &Market) {
        self.send(Cmd::Unsubscribe {
            kind,
            market: market.clone(),
        });
    }

    /// Subscribe to the ticker stream for `market`.
    pub fn subscribe_ticker(&self, market: &Market) {
        self.subscribe(StreamKind::Ticker, market);
    }

    /// Unsubscribe from the ticker stream for `market`.
    pub fn unsubscribe_ticker(&self, market: &Market) {
        self.unsubscribe(StreamKind::Ticker, market);
    }

    /// Subscribe to the trade stream for `market`.
    pub fn subscribe_trades(&self, market: &Market) {
        self.subscribe(StreamKind::Trades, market);
    }

    /// Unsubscribe from the trade stream for `market`.
    pub fn unsubscribe_trades(&self, market: &Market) {
        self.unsubscribe(StreamKind::Trades, market);
    }

    /// Subscribe to the candle stream for `market`.
    pub fn subscribe_candles(&self, market: &Market) {
        self.subscribe(StreamKind::Candles, market);
    }

    /// Unsubscribe from the candle stream for `market`.
    pub fn unsubscribe_candles(&self, market: &Market) {
        self.unsubscribe(StreamKind::Candles, market);
    }

    /// Subscribe to level-2 snapshots for `market`.
    pub fn subscribe_level2_snapshots(&self, market: &Market) {
        self.subscribe(StreamKind::Level2Snapshots, market);
    }

    /// Unsubscribe from level-2 snapshots for `market`.
    pub fn unsubscribe_level2_snapshots(&self, market: &Market) {
        self.unsubscribe(StreamKind::Level2Snapshots, market);
    }

    /// Subscribe to level-2 diffs for `market`.
    pub fn subscribe_level2_updates(&self, market: &Market) {
        self.subscribe(StreamKind::Level2Updates, market);
    }

    /// Unsubscribe from level-2 diffs for `market`.
    pub fn unsubscribe_level2_updates(&self, market: &Market) {
        self.unsubscribe(StreamKind::Level2Updates, market);
    }

    /// Subscribe to level-3 snapshots for `market`.
    pub fn subscribe_level3_snapshots(&self, market: &Market) {
        self.subscribe(StreamKind::Level3Snapshots, market);
    }

    /// Unsubscribe from level-3 snapshots for `market`.
    pub fn unsubscribe_level3_snapshots(&self, market: &Market) {
        self.unsubscribe(StreamKind::Level3Snapshots, market);
    }

    /// Subscribe to level-3 diffs for `market`.
    pub fn subscribe_level3_updates(&self, market: &Market) {
        self.subscribe(StreamKind::Level3Updates, market);
    }

    /// Unsubscribe from level-3 diffs for `market`.
    pub fn unsubscribe_level3_updates(&self, market: &Market) {
        self.unsubscribe(StreamKind::Level3Updates, market);
    }

    /// Cycle the connection; subscriptions are replayed, not cleared.
    ///
    /// Rapid calls coalesce: at most one socket cycle per configured
    /// throttle window.
    pub fn reconnect(&self) {
        self.send(Cmd::Reconnect);
    }

    /// Close for good: socket closed, maps cleared, `Closed` emitted.
    pub fn close(&self) {
        self.send(Cmd::Close);
    }
}

struct ClientTask<A: Adapter> {
    adapter: A,
    subs: SubscriptionMaps,
    socket: ResilientSocket,
    events: mpsc::UnboundedSender<ClientEvent>,
    watcher: Option<LivenessWatcher>,
    codec: Option<SerializedCodec>,
    sub_batch: Option<Batch<(StreamKind, String)>>,
    reconnect_gate: Throttle<()>,
    connected: bool,
    started: bool,
    closing: bool,
}

impl<A: Adapter> ClientTask<A> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        mut socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    ) {
        loop {
            let watch_armed = self.watcher.as_ref().is_some_and(LivenessWatcher::is_armed);
            let watch_deadline = self
                .watcher
                .as_ref()
                .filter(|w| w.is_armed())
                .map_or_else(Instant::now, LivenessWatcher::deadline);

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None => {
                        // Every handle dropped: shut the socket down too.
                        self.socket.close();
                        return;
                    }
                    Some(cmd) => self.handle_cmd(cmd),
                },
                internal = internal_rx.recv() => match internal {
                    None => return,
                    Some(internal) => self.handle_internal(internal),
                },
                event = socket_events.recv() => match event {
                    None => return,
                    Some(event) => {
                        if !self.handle_socket_event(event).await {
                            return;
                        }
                    }
                },
                () = sleep_until(watch_deadline), if watch_armed => {
                    warn!(
                        exchange = self.adapter.exchange(),
                        "no data within the liveness window, reconnecting"
                    );
                    if let Some(watcher) = &mut self.watcher {
                        watcher.stop();
                    }
                    self.reconnect_gate.call(());
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::CycleSocket => {
                if self.started && !self.closing {
                    self.socket.reconnect();
                }
            }
            Internal::FlushSubs(pairs) => self.flush_subscribes(&pairs),
        }
    }

    fn handle_cmd(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Subscribe { kind, market } => self.handle_subscribe(kind, market),
            Cmd::Unsubscribe { kind, market } => self.handle_unsubscribe(kind, &market),
            Cmd::Reconnect => self.reconnect_gate.call(()),
            Cmd::Close => {
                debug!(exchange = self.adapter.exchange(), "closing client");
                self.closing = true;
                self.subs.clear();
                if let Some(watcher) = &mut self.watcher {
                    watcher.stop();
                }
                if let Some(batch) = &self.sub_batch {
                    batch.cancel();
                }
                self.reconnect_gate.cancel();
                self.socket.close();
            }
        }
    }

    fn handle_subscribe(&mut self, kind: StreamKind, market: Market) {
        if !self.adapter.capabilities().supports(kind) {
            trace!(
                exchange = self.adapter.exchange(),
                ?kind,
                "subscribe to unsupported stream ignored"
            );
            return;
        }
        if self.closing || self.subs.map(kind).contains_key(&market.id) {
            return;
        }

        // Lazy connect: the first subscription of any kind opens the
        // socket; the post-connect sweep picks this entry up.
        if !self.started {
            self.socket.connect();
            self.started = true;
        }

        let remote_id = market.id.clone();
        self.subs.map_mut(kind).insert(remote_id.clone(), market);

        if self.connected {
            match &self.sub_batch {
                Some(batch) => batch.push((kind, remote_id)),
                None => {
                    for frame in self
                        .adapter
                        .subscribe_frames(kind, std::slice::from_ref(&remote_id))
                    {
                        self.socket.send(frame);
                    }
                }
            }
        }
    }

    fn handle_unsubscribe(&mut self, kind: StreamKind, market: &Market) {
        if self.subs.map_mut(kind).remove(&market.id).is_none() {
            return;
        }
        if self.connected {
            for frame in self
                .adapter
                .unsubscribe_frames(kind, std::slice::from_ref(&market.id))
            {
                self.socket.send(frame);
            }
        }
        // The connection stays open even with zero subscriptions left:
        // cycling sockets under rapid resubscribe costs more than an
        // idle connection.
    }

    /// Flush batched live subscribes, skipping entries unsubscribed
    /// while they sat in the batch.
    fn flush_subscribes(&mut self, pairs: &[(StreamKind, String)]) {
        if !self.connected {
            return;
        }
        for kind in StreamKind::ALL {
            let ids: Vec<String> = pairs
                .iter()
                .filter(|(k, id)| *k == kind && self.subs.map(kind).contains_key(id))
                .map(|(_, id)| id.clone())
                .collect();
            if ids.is_empty() {
                continue;
            }
            for frame in self.adapter.subscribe_frames(kind, &ids) {
                self.socket.send(frame);
            }
        }
    }

    /// Replay every active subscription after a (re)connect.
    fn resubscribe_all(&mut self) {
        for kind in StreamKind::ALL {
            let ids: Vec<String> = self.subs.map(kind).keys().cloned().collect();
            if ids.is_empty() {
                continue;
            }
            let per_frame = self
                .adapter
                .subscribe_batch()
                .map_or(ids.len(), |limits| limits.max_per_frame.max(1));
            for chunk in ids.chunks(per_frame.max(1)) {
                for frame in self.adapter.subscribe_frames(kind, chunk) {
                    self.socket.send(frame);
                }
            }
        }
    }

    /// Returns false when the client is done and the task must exit.
    async fn handle_socket_event(&mut self, event: SocketEvent) -> bool {
        match event {
            SocketEvent::Connecting => {
                let _ = self.events.send(ClientEvent::Connecting);
            }
            SocketEvent::Connected => {
                self.connected = true;
                let _ = self.events.send(ClientEvent::Connected);
                self.resubscribe_all();
                if let Some(watcher) = &mut self.watcher {
                    watcher.start();
                }
            }
            SocketEvent::Reconnecting => {
                let _ = self.events.send(ClientEvent::Reconnecting);
            }
            SocketEvent::Disconnected => {
                self.connected = false;
                if let Some(watcher) = &mut self.watcher {
                    watcher.stop();
                }
                let _ = self.events.send(ClientEvent::Disconnected);
            }
            SocketEvent::Closing => {
                let _ = self.events.send(ClientEvent::Closing);
            }
            SocketEvent::Closed => {
                self.connected = false;
                let _ = self.events.send(ClientEvent::Closed);
                return false;
            }
            SocketEvent::Error(err) => {
                let _ = self.events.send(ClientEvent::Error(err));
            }
            SocketEvent::Message(message) => {
                self.handle_message(message).await;
            }
        }
        true
    }

    async fn handle_message(&mut self, message: Message) {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(payload) => match self.inflate(payload).await {
                Ok(text) => text,
                Err(err) => {
                    let _ = self.events.send(ClientEvent::Error(err));
                    return;
                }
            },
            // Pings are answered inside the socket task; anything else
            // carries no data.
            _ => return,
        };

        // One bad message never kills the connection: parse failures
        // become error events and the stream moves on.
        match self.adapter.parse(&text, &self.subs) {
            Ok(parsed) => {
                for reply in parsed.replies {
                    self.socket.send(reply);
                }
                for (event, market) in parsed.events {
                    if let Some(watcher) = &mut self.watcher {
                        watcher.mark();
                    }
                    let _ = self.events.send(ClientEvent::Data(event, market));
                }
            }
            Err(err) => {
                let _ = self.events.send(ClientEvent::Error(err));
            }
        }
    }

    async fn inflate(&self, payload: Vec<u8>) -> Result<String, crate::FeedError> {
        let bytes = match (&self.codec, self.adapter.compression()) {
            (Some(codec), Some(compression)) => {
                codec.decompress(compression.op(), payload).await?
            }
            _ => payload,
        };
        String::from_utf8(bytes).map_err(|e| crate::FeedError::Parse {
            exchange: self.adapter.exchange(),
            detail: format!("binary frame is not utf-8: {e}"),
        })
    }
}
