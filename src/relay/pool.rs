//! Multi-relay connection pool.
//!
//! Every endpoint connects on its own task. The primary (live) subscription
//! is issued once per endpoint as endpoints come up; point queries fan out
//! to whatever is connected at the time of the call.

use futures_util::StreamExt;
use nostr_core::Filter;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{RelayClient, RelayConnector, Subscription, SubscriptionMessage, SubscriptionMode};
use crate::notify::Notifier;

/// A subscription message tagged with the relay it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayDelivery {
    pub relay: String,
    pub message: SubscriptionMessage,
}

#[derive(Default)]
struct PoolState {
    clients: HashMap<String, Arc<dyn RelayClient>>,
    /// Connected endpoints in connection order.
    connected: Vec<String>,
    /// Endpoints already holding the primary subscription.
    subscribed: HashSet<String>,
    /// Connection attempts still in flight.
    pending: usize,
}

type PrimarySubscription = (Filter, mpsc::UnboundedSender<RelayDelivery>);

pub struct RelayPool {
    connector: Arc<dyn RelayConnector>,
    connect_timeout: Duration,
    state: Mutex<PoolState>,
    primary: Mutex<Option<PrimarySubscription>>,
    notifier: Arc<Notifier>,
    cancel: CancellationToken,
}

impl RelayPool {
    pub fn new(
        connector: Arc<dyn RelayConnector>,
        connect_timeout: Duration,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            state: Mutex::new(PoolState::default()),
            primary: Mutex::new(None),
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    /// Start connecting to every endpoint. Returns without waiting.
    pub fn connect(self: &Arc<Self>, endpoints: &[String]) {
        self.notifier.status("Connecting to relays...");

        for url in endpoints {
            let client = {
                let mut state = self.state.lock();
                if state.clients.contains_key(url) {
                    debug!("Relay {url} already known, skipping");
                    continue;
                }
                let client = self.connector.client(url);
                state.clients.insert(url.clone(), client.clone());
                state.pending += 1;
                client
            };

            let pool = Arc::clone(self);
            let url = url.clone();
            tokio::spawn(async move {
                let attempt = tokio::select! {
                    _ = pool.cancel.cancelled() => return,
                    attempt = tokio::time::timeout(pool.connect_timeout, client.connect()) => {
                        attempt
                    }
                };
                match attempt {
                    Ok(Ok(())) => pool.on_connected(url, client).await,
                    Ok(Err(e)) => {
                        warn!("Failed to connect to {url}: {e}");
                        pool.forget(&url, &client).await;
                    }
                    Err(_) => {
                        warn!(
                            "Connection timeout for {url} after {:?}",
                            pool.connect_timeout
                        );
                        pool.forget(&url, &client).await;
                    }
                }
                pool.settle_attempt();
            });
        }

        if self.state.lock().pending == 0 {
            self.report_if_empty();
        }
    }

    /// Install the primary subscription and issue it to every connected
    /// endpoint that does not hold it yet.
    pub async fn subscribe(
        self: &Arc<Self>,
        filter: Filter,
        sink: mpsc::UnboundedSender<RelayDelivery>,
    ) {
        *self.primary.lock() = Some((filter, sink));
        self.issue_primary().await;
    }

    /// One-shot query against every connected endpoint.
    ///
    /// The returned stream merges all endpoints and ends once each of them
    /// has signalled end-of-stream or dropped.
    pub fn query(&self, filter: Filter) -> mpsc::UnboundedReceiver<RelayDelivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        for (url, client) in self.connected_clients() {
            let tx = tx.clone();
            let filter = filter.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let subscription = tokio::select! {
                    _ = cancel.cancelled() => return,
                    sub = client.subscribe(filter, SubscriptionMode::OneShot) => sub,
                };
                match subscription {
                    Ok(sub) => pump(url, sub, tx, cancel, true).await,
                    Err(e) => debug!("Query on {url} failed: {e}"),
                }
            });
        }
        rx
    }

    pub fn connected_count(&self) -> usize {
        self.state.lock().connected.len()
    }

    pub fn connected_relays(&self) -> Vec<String> {
        self.state.lock().connected.clone()
    }

    /// Close every client and stop all pump tasks.
    pub async fn close(&self) {
        self.cancel.cancel();
        let clients: Vec<Arc<dyn RelayClient>> = {
            let mut state = self.state.lock();
            state.connected.clear();
            state.subscribed.clear();
            state.clients.drain().map(|(_, c)| c).collect()
        };
        self.primary.lock().take();
        for client in &clients {
            client.close().await;
        }
        self.notifier.set_relay_count(0);
        info!("Relay pool closed ({} clients)", clients.len());
    }

    async fn on_connected(self: &Arc<Self>, url: String, client: Arc<dyn RelayClient>) {
        if self.cancel.is_cancelled() {
            client.close().await;
            return;
        }

        let count = {
            let mut state = self.state.lock();
            if !state.connected.contains(&url) {
                state.connected.push(url.clone());
            }
            state.connected.len()
        };
        info!("Connected to {url} ({count} total)");
        self.notifier.set_relay_count(count);
        self.notifier.status(format!("Connected to {count} relays"));

        self.issue_primary().await;

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = pool.cancel.cancelled() => {}
                _ = client.disconnected() => pool.on_disconnected(&url),
            }
        });
    }

    fn on_disconnected(&self, url: &str) {
        let count = {
            let mut state = self.state.lock();
            state.connected.retain(|u| u != url);
            state.subscribed.remove(url);
            state.connected.len()
        };
        warn!("Relay {url} disconnected ({count} remaining)");
        self.notifier.set_relay_count(count);
        if count == 0 {
            self.notifier.status("No relays connected");
        }
    }

    async fn issue_primary(self: &Arc<Self>) {
        let Some((filter, sink)) = self.primary.lock().clone() else {
            return;
        };

        let targets: Vec<(String, Arc<dyn RelayClient>)> = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut targets = Vec::new();
            for url in &state.connected {
                if state.subscribed.contains(url) {
                    continue;
                }
                if let Some(client) = state.clients.get(url) {
                    state.subscribed.insert(url.clone());
                    targets.push((url.clone(), client.clone()));
                }
            }
            targets
        };
        if targets.is_empty() {
            return;
        }

        self.notifier.status("Subscribing to notes...");
        for (url, client) in targets {
            match client.subscribe(filter.clone(), SubscriptionMode::Live).await {
                Ok(sub) => {
                    info!("Subscribed to {url}");
                    tokio::spawn(pump(url, sub, sink.clone(), self.cancel.clone(), false));
                }
                Err(e) => {
                    warn!("Failed to subscribe on {url}: {e}");
                    self.state.lock().subscribed.remove(&url);
                }
            }
        }
    }

    async fn forget(&self, url: &str, client: &Arc<dyn RelayClient>) {
        self.state.lock().clients.remove(url);
        client.close().await;
    }

    fn settle_attempt(&self) {
        {
            let mut state = self.state.lock();
            state.pending = state.pending.saturating_sub(1);
            if state.pending > 0 {
                return;
            }
        }
        self.report_if_empty();
    }

    fn report_if_empty(&self) {
        if self.connected_count() == 0 && !self.cancel.is_cancelled() {
            warn!("No relays connected");
            self.notifier.status("No relays connected");
        }
    }

    fn connected_clients(&self) -> Vec<(String, Arc<dyn RelayClient>)> {
        let state = self.state.lock();
        state
            .connected
            .iter()
            .filter_map(|url| state.clients.get(url).map(|c| (url.clone(), c.clone())))
            .collect()
    }
}

/// Forward one subscription into a shared sink until it ends.
async fn pump(
    relay: String,
    mut sub: Subscription,
    sink: mpsc::UnboundedSender<RelayDelivery>,
    cancel: CancellationToken,
    stop_at_end: bool,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = sub.next() => message,
        };
        let Some(message) = message else {
            break;
        };
        let end = message == SubscriptionMessage::EndOfStream;
        let delivery = RelayDelivery {
            relay: relay.clone(),
            message,
        };
        if sink.send(delivery).is_err() || (end && stop_at_end) {
            break;
        }
    }
    debug!("Subscription {} on {relay} finished", sub.id());
}
