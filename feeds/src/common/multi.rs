//! Market-sharded client facade

use crate::common::client::BaseClient;
use crate::common::event::{ClientEvent, MultiEvent};
use common::Market;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, Semaphore, mpsc};
use tracing::debug;

/// Connection-establishment pacing for a [`MultiClient`].
#[derive(Clone, Debug)]
pub struct MultiClientConfig {
    /// How many connections may be establishing at once
    pub max_concurrent_connects: usize,
    /// Extra delay a finished connect holds its slot, pacing the rate
    pub connect_pacing: Duration,
}

impl Default for MultiClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_connects: 3,
            connect_pacing: Duration::from_millis(250),
        }
    }
}

/// Builds one child client per market.
///
/// Implemented for free by any
/// `Fn(&Market) -> (BaseClient, receiver)` closure.
pub trait ClientFactory: Send + Sync + 'static {
    /// Create the child client serving `market`.
    fn create(&self, market: &Market) -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>);
}

impl<F> ClientFactory for F
where
    F: Fn(&Market) -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) + Send + Sync + 'static,
{
    fn create(&self, market: &Market) -> (BaseClient, mpsc::UnboundedReceiver<ClientEvent>) {
        self(market)
    }
}

/// Many single-market clients behind one facade.
///
/// For venues whose per-connection subscription limit forces one
/// connection per market. A semaphore bounds how many connections may be
/// establishing concurrently, and each finished handshake holds its slot
/// for an extra pacing delay — connection *rate* is limited
/// independently of concurrency, so a large subscribe burst cannot
/// thunder against the venue's connection limits.
///
/// Creation is guarded per market: concurrent subscribes for one market
/// share a single in-flight creation instead of racing a second
/// connection. Child events are forwarded on the facade's channel,
/// annotated with the originating market.
pub struct MultiClient {
    factory: Arc<dyn ClientFactory>,
    semaphore: Arc<Semaphore>,
    pacing: Duration,
    clients: Mutex<HashMap<String, Arc<OnceCell<BaseClient>>>>,
    events: mpsc::UnboundedSender<MultiEvent>,
}

impl MultiClient {
    /// Create a facade; returns it with its event stream.
    pub fn new(
        factory: impl ClientFactory,
        config: MultiClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<MultiEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                factory: Arc::new(factory),
                semaphore: Arc::new(Semaphore::new(config.max_concurrent_connects.max(1))),
                pacing: config.connect_pacing,
                clients: Mutex::new(HashMap::new()),
                events,
            },
            event_rx,
        )
    }

    /// The child client for `market`, creating it exactly once.
    async fn client_for(&self, market: &Market) -> BaseClient {
        let cell = {
            let mut clients = self.clients.lock().await;
            Arc::clone(
                clients
                    .entry(market.id.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        cell.get_or_init(|| async {
            // The permit bounds concurrent handshakes; holding it through
            // the pacing sleep bounds the establishment rate too.
            let _permit = self
                .semaphore
                .acquire()
                .await
                .expect("connect semaphore never closes");
            debug!(market = %market.id, "creating child client");
            let (client, mut child_events) = self.factory.create(market);

            let facade = self.events.clone();
            let tag = market.clone();
            tokio::spawn(async move {
                while let Some(event) = child_events.recv().await {
                    if facade
                        .send(MultiEvent {
                            market: tag.clone(),
                            event,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            });

            tokio::time::sleep(self.pacing).await;
            client
        })
        .await
        .clone()
    }

    /// Child client for `market` if one was already created.
    async fn existing(&self, market: &Market) -> Option<BaseClient> {
        let clients = self.clients.lock().await;
        clients.get(&market.id).and_then(|cell| cell.get().cloned())
    }

    /// Subscribe to the ticker stream for `market`.
    pub async fn subscribe_ticker(&self, market: &Market) {
        self.client_for(market).await.subscribe_ticker(market);
    }

    /// Unsubscribe from the ticker stream for `market`.
    pub async fn unsubscribe_ticker(&self, market: &Market) {
        if let Some(client) = self.existing(market).await {
            client.unsubscribe_ticker(market);
        }
    }

    /// Subscribe to the trade stream for `market`.
    pub async fn subscribe_trades(&self, market: &Market) {
        self.client_for(market).await.subscribe_trades(market);
    }

    /// Unsubscribe from the trade stream for `market`.
    pub async fn unsubscribe_trades(&self, market: &Market) {
        if let Some(client) = self.existing(market).await {
            client.unsubscribe_trades(market);
        }
    }

    /// Subscribe to the candle stream for `market`.
    pub async fn subscribe_candles(&self, market: &Market) {
        self.client_for(market).await.subscribe_candles(market);
    }

    /// Unsubscribe from the candle stream for `market`.
    pub async fn unsubscribe_candles(&self, market: &Market) {
        if let Some(client) = self.existing(market).await {
            client.unsubscribe_candles(market);
        }
    }

    /// Subscribe to level-2 snapshots for `market`.
    pub async fn subscribe_level2_snapshots(&self, market: &Market) {
        self.client_for(market).await.subscribe_level2_snapshots(market);
    }

    /// Unsubscribe from level-2 snapshots for `market`.
    pub async fn unsubscribe_level2_snapshots(&self, market: &Market) {
        if let Some(client) = self.existing(market).await {
            client.unsubscribe_level2_snapshots(market);
        }
    }

    /// Subscribe to level-2 diffs for `market`.
    pub async fn subscribe_level2_updates(&self, market: &Market) {
        self.client_for(market).await.subscribe_level2_updates(market);
    }

    /// Unsubscribe from level-2 diffs for `market`.
    pub async fn unsubscribe_level2_updates(&self, market: &Market) {
        if let Some(client) = self.existing(market).await {
            client.unsubscribe_level2_updates(market);
        }
    }

    /// Subscribe to level-3 snapshots for `market`.
    pub async fn subscribe_level3_snapshots(&self, market: &Market) {
        self.client_for(market).await.subscribe_level3_snapshots(market);
    }

    /// Unsubscribe from level-3 snapshots for `market`.
    pub async fn unsubscribe_level3_snapshots(&self, market: &Market) {
        if let Some(client) = self.existing(market).await {
            client.unsubscribe_level3_snapshots(market);
        }
    }

    /// Subscribe to level-3 diffs for `market`.
    pub async fn subscribe_level3_updates(&self, market: &Market) {
        self.client_for(market).await.subscribe_level3_updates(market);
    }

    /// Unsubscribe from level-3 diffs for `market`.
    pub async fn unsubscribe_level3_updates(&self, market: &Market) {
        if let Some(client) = self.existing(market).await {
            client.unsubscribe_level3_updates(market);
        }
    }

    /// Number of child clients created so far.
    pub async fn client_count(&self) -> usize {
        let clients = self.clients.lock().await;
        clients.values().filter(|cell| cell.get().is_some()).count()
    }

    /// Close every child client.
    pub async fn close(&self) {
        let clients = self.clients.lock().await;
        for cell in clients.values() {
            if let Some(client) = cell.get() {
                client.close();
            }
        }
    }
}
