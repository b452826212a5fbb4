//! Auto-reconnecting WebSocket wrapper

use crate::common::error::FeedError;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Lifecycle and data events emitted by a [`ResilientSocket`].
#[derive(Debug)]
pub enum SocketEvent {
    /// A connection attempt started
    Connecting,
    /// The handshake completed
    Connected,
    /// A retry was scheduled after an unexpected disconnect
    Reconnecting,
    /// The connection dropped unexpectedly
    Disconnected,
    /// An explicit close began
    Closing,
    /// The socket is closed for good; the task has exited
    Closed,
    /// One inbound frame
    Message(Message),
    /// A non-fatal transport error
    Error(FeedError),
}

/// Commands accepted by the socket task.
#[derive(Debug)]
pub enum SocketCmd {
    /// Open the connection (first connect)
    Connect,
    /// Send a text frame; silently dropped while not connected
    Send(String),
    /// Drop and immediately re-establish the connection
    Reconnect,
    /// Close for good
    Close,
}

/// Socket endpoint and retry policy.
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// WebSocket URL
    pub url: String,
    /// Fixed delay before each reconnect attempt
    pub retry_delay: Duration,
    /// Upper bound of random jitter added to each delay (zero disables)
    pub retry_jitter: Duration,
}

impl SocketConfig {
    /// Default policy for `url`: retry every 15s, up to 2s jitter.
    ///
    /// Retries repeat forever — a data feed should outlive any exchange
    /// outage. The jitter keeps a fleet of processes from reconnecting in
    /// lockstep when the outage ends.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_delay: Duration::from_secs(15),
            retry_jitter: Duration::from_secs(2),
        }
    }

    /// Override the retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Override the jitter bound.
    #[must_use]
    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }
}

/// Handle to a socket task that keeps one WebSocket connection alive.
///
/// The task owns the connection. After an unexpected disconnect — read
/// error, server-initiated close, failed handshake — it emits
/// [`SocketEvent::Disconnected`] then [`SocketEvent::Reconnecting`] and
/// retries on a fixed delay, forever, until [`close`](Self::close) is
/// called. `close` is honored in every state, including mid-backoff: the
/// pending retry timer is cancelled rather than left to resurrect the
/// connection. Sends while not connected are dropped silently — callers
/// track their subscriptions and replay them on `Connected` instead of
/// relying on send queueing.
#[derive(Clone)]
pub struct ResilientSocket {
    cmd_tx: mpsc::UnboundedSender<SocketCmd>,
}

impl ResilientSocket {
    /// Spawn the socket task; returns the handle and its event stream.
    ///
    /// The task is idle until [`connect`](Self::connect) is called.
    #[must_use]
    pub fn spawn(config: SocketConfig) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(config, cmd_rx, event_tx));
        (Self { cmd_tx }, event_rx)
    }

    /// Wrap an existing command channel.
    ///
    /// For custom transports and tests: the holder of the receiving end
    /// plays the socket task and feeds `SocketEvent`s of its own.
    #[must_use]
    pub fn from_channel(cmd_tx: mpsc::UnboundedSender<SocketCmd>) -> Self {
        Self { cmd_tx }
    }

    /// Request the initial connection.
    pub fn connect(&self) {
        let _ = self.cmd_tx.send(SocketCmd::Connect);
    }

    /// Send a text frame; dropped silently while not connected.
    pub fn send(&self, text: String) {
        let _ = self.cmd_tx.send(SocketCmd::Send(text));
    }

    /// Drop the connection and re-establish it immediately.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(SocketCmd::Reconnect);
    }

    /// Close for good; the task exits after emitting `Closed`.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(SocketCmd::Close);
    }
}

enum LoopOutcome {
    /// Retry after the backoff delay
    Backoff,
    /// Retry right now (explicit reconnect request)
    RetryNow,
    /// Exit the task (explicit close or all handles dropped)
    Exit,
}

async fn run(
    config: SocketConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<SocketCmd>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    if url::Url::parse(&config.url).is_err() {
        warn!(url = %config.url, "endpoint is not a valid url; connects will fail");
    }

    // Idle until the first connect request.
    loop {
        match cmd_rx.recv().await {
            None => return,
            Some(SocketCmd::Close) => {
                let _ = events.send(SocketEvent::Closing);
                let _ = events.send(SocketEvent::Closed);
                return;
            }
            Some(SocketCmd::Connect | SocketCmd::Reconnect) => break,
            Some(SocketCmd::Send(_)) => {
                debug!(url = %config.url, "dropping send while disconnected");
            }
        }
    }

    loop {
        let outcome = connect_once(&config, &mut cmd_rx, &events).await;
        match outcome {
            LoopOutcome::Exit => return,
            LoopOutcome::RetryNow => continue,
            LoopOutcome::Backoff => {
                let _ = events.send(SocketEvent::Reconnecting);
                if !backoff(&config, &mut cmd_rx, &events).await {
                    return;
                }
            }
        }
    }
}

/// One connection attempt plus its read loop.
async fn connect_once(
    config: &SocketConfig,
    cmd_rx: &mut mpsc::UnboundedReceiver<SocketCmd>,
    events: &mpsc::UnboundedSender<SocketEvent>,
) -> LoopOutcome {
    let _ = events.send(SocketEvent::Connecting);
    debug!(url = %config.url, "connecting");

    let connect_fut = connect_async(&config.url);
    tokio::pin!(connect_fut);

    // Stay responsive to close while the handshake is in flight. A close
    // that lands here drops the half-open connection without surfacing
    // the handshake error (the expected close-before-connected case).
    let stream = loop {
        tokio::select! {
            res = &mut connect_fut => match res {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    warn!(url = %config.url, error = %e, "connect failed");
                    let _ = events.send(SocketEvent::Error(FeedError::Transport(e.to_string())));
                    let _ = events.send(SocketEvent::Disconnected);
                    return LoopOutcome::Backoff;
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                None => return LoopOutcome::Exit,
                Some(SocketCmd::Close) => {
                    let _ = events.send(SocketEvent::Closing);
                    let _ = events.send(SocketEvent::Closed);
                    return LoopOutcome::Exit;
                }
                Some(SocketCmd::Send(_)) => {
                    debug!(url = %config.url, "dropping send while connecting");
                }
                Some(SocketCmd::Connect | SocketCmd::Reconnect) => {}
            }
        }
    };

    info!(url = %config.url, "connected");
    let _ = events.send(SocketEvent::Connected);
    let (mut sink, mut reader) = stream.split();

    loop {
        tokio::select! {
            msg = reader.next() => match msg {
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        let _ = events.send(SocketEvent::Disconnected);
                        return LoopOutcome::Backoff;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(url = %config.url, frame = ?frame, "server closed the connection");
                    let _ = events.send(SocketEvent::Disconnected);
                    return LoopOutcome::Backoff;
                }
                Some(Ok(msg)) => {
                    let _ = events.send(SocketEvent::Message(msg));
                }
                Some(Err(e)) => {
                    warn!(url = %config.url, error = %e, "read error");
                    let _ = events.send(SocketEvent::Error(FeedError::Transport(e.to_string())));
                    let _ = events.send(SocketEvent::Disconnected);
                    return LoopOutcome::Backoff;
                }
                None => {
                    let _ = events.send(SocketEvent::Disconnected);
                    return LoopOutcome::Backoff;
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return LoopOutcome::Exit;
                }
                Some(SocketCmd::Close) => {
                    let _ = events.send(SocketEvent::Closing);
                    // Errors from closing an already-dying stream are
                    // expected and suppressed.
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = events.send(SocketEvent::Closed);
                    return LoopOutcome::Exit;
                }
                Some(SocketCmd::Reconnect) => {
                    info!(url = %config.url, "reconnect requested");
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = events.send(SocketEvent::Disconnected);
                    return LoopOutcome::RetryNow;
                }
                Some(SocketCmd::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(url = %config.url, error = %e, "send failed");
                        let _ = events.send(SocketEvent::Error(FeedError::Transport(e.to_string())));
                        let _ = events.send(SocketEvent::Disconnected);
                        return LoopOutcome::Backoff;
                    }
                }
                Some(SocketCmd::Connect) => {}
            }
        }
    }
}

/// Wait out the retry delay; false means the task must exit.
async fn backoff(
    config: &SocketConfig,
    cmd_rx: &mut mpsc::UnboundedReceiver<SocketCmd>,
    events: &mpsc::UnboundedSender<SocketEvent>,
) -> bool {
    let jitter = if config.retry_jitter.is_zero() {
        Duration::ZERO
    } else {
        rand::thread_rng().gen_range(Duration::ZERO..=config.retry_jitter)
    };
    let delay = tokio::time::sleep(config.retry_delay + jitter);
    tokio::pin!(delay);

    loop {
        tokio::select! {
            () = &mut delay => return true,
            cmd = cmd_rx.recv() => match cmd {
                None => return false,
                Some(SocketCmd::Close) => {
                    let _ = events.send(SocketEvent::Closing);
                    let _ = events.send(SocketEvent::Closed);
                    return false;
                }
                // An explicit request short-circuits the wait.
                Some(SocketCmd::Connect | SocketCmd::Reconnect) => return true,
                Some(SocketCmd::Send(_)) => {
                    debug!(url = %config.url, "dropping send during backoff");
                }
            }
        }
    }
}
