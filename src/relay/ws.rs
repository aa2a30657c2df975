//! WebSocket relay client speaking NIP-01.
//!
//! One socket per relay. A writer task drains an outgoing queue and a reader
//! task routes `EVENT`/`EOSE` messages to per-subscription channels by
//! subscription id.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use nostr_core::{ClientMessage, Filter, RelayMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    RelayClient, RelayConnector, RelayError, Subscription, SubscriptionMessage, SubscriptionMode,
};

/// Per-subscription channel depth before the reader applies backpressure.
const SUBSCRIPTION_BUFFER: usize = 256;

struct Route {
    tx: mpsc::Sender<SubscriptionMessage>,
    mode: SubscriptionMode,
}

type Routes = Arc<Mutex<HashMap<String, Route>>>;

pub struct WsRelayClient {
    url: String,
    routes: Routes,
    outgoing: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    connected: Arc<watch::Sender<bool>>,
    next_sub: AtomicU64,
    cancel: CancellationToken,
}

impl WsRelayClient {
    pub fn new(url: impl Into<String>) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            url: url.into(),
            routes: Arc::new(Mutex::new(HashMap::new())),
            outgoing: Mutex::new(None),
            connected: Arc::new(connected),
            next_sub: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

#[async_trait]
impl RelayClient for WsRelayClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<(), RelayError> {
        if self.is_connected() {
            return Ok(());
        }

        info!("Connecting to {}...", self.url);
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RelayError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        info!("Connected to {}", self.url);

        let (mut write, mut read) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
        *self.outgoing.lock() = Some(out_tx.clone());
        self.connected.send_replace(true);

        let conn_cancel = self.cancel.child_token();

        // Writer
        {
            let cancel = conn_cancel.clone();
            let url = self.url.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            break;
                        }
                        msg = out_rx.recv() => match msg {
                            Some(msg) => {
                                if let Err(e) = write.send(msg).await {
                                    warn!("Write to {url} failed: {e}");
                                    cancel.cancel();
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            });
        }

        // Reader
        {
            let cancel = conn_cancel;
            let url = self.url.clone();
            let routes = self.routes.clone();
            let connected = self.connected.clone();
            tokio::spawn(async move {
                loop {
                    let msg = tokio::select! {
                        _ = cancel.cancelled() => break,
                        msg = read.next() => msg,
                    };
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            handle_text(&url, text.as_str(), &routes, &out_tx).await;
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = out_tx.send(WsMessage::Pong(data));
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("Relay {url} sent close frame");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket error from {url}: {e}");
                            break;
                        }
                        None => break,
                    }
                }

                // Dropping the routes ends every open subscription stream.
                routes.lock().clear();
                connected.send_replace(false);
                cancel.cancel();
                info!("Disconnected from {url}");
            });
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        filter: Filter,
        mode: SubscriptionMode,
    ) -> Result<Subscription, RelayError> {
        let outgoing = self.outgoing.lock().clone();
        let out = match outgoing {
            Some(out) if self.is_connected() => out,
            _ => return Err(RelayError::NotConnected(self.url.clone())),
        };

        let id = format!("qf-{}", self.next_sub.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.routes.lock().insert(id.clone(), Route { tx, mode });

        let req = ClientMessage::Req {
            subscription_id: id.clone(),
            filter,
        };
        if out.send(WsMessage::Text(req.as_json().into())).is_err() {
            self.routes.lock().remove(&id);
            return Err(RelayError::NotConnected(self.url.clone()));
        }
        debug!("Opened subscription {id} on {}", self.url);
        Ok(Subscription::new(id, rx))
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.routes.lock().clear();
        self.outgoing.lock().take();
        self.connected.send_replace(false);
    }

    async fn disconnected(&self) {
        let mut rx = self.connected.subscribe();
        loop {
            let up = *rx.borrow_and_update();
            if !up {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn handle_text(
    url: &str,
    text: &str,
    routes: &Routes,
    out_tx: &mpsc::UnboundedSender<WsMessage>,
) {
    let message = match RelayMessage::from_json(text) {
        Ok(m) => m,
        Err(e) => {
            debug!("Ignoring unparseable message from {url}: {e}");
            return;
        }
    };

    match message {
        RelayMessage::Event {
            subscription_id,
            event,
        } => {
            deliver(
                routes,
                &subscription_id,
                SubscriptionMessage::Event(event),
                out_tx,
            )
            .await;
        }
        RelayMessage::EndOfStoredEvents(subscription_id) => {
            deliver(routes, &subscription_id, SubscriptionMessage::EndOfStream, out_tx).await;
            let one_shot = {
                let mut routes = routes.lock();
                match routes.get(&subscription_id) {
                    Some(route) if route.mode == SubscriptionMode::OneShot => {
                        routes.remove(&subscription_id);
                        true
                    }
                    _ => false,
                }
            };
            if one_shot {
                send_close(out_tx, &subscription_id);
            }
        }
        RelayMessage::Closed {
            subscription_id,
            message,
        } => {
            warn!("Relay {url} closed subscription {subscription_id}: {message}");
            routes.lock().remove(&subscription_id);
        }
        RelayMessage::Notice(notice) => warn!("Relay notice from {url}: {notice}"),
        RelayMessage::Ok { .. } | RelayMessage::Auth(_) => {
            debug!("Ignoring control message from {url}");
        }
    }
}

async fn deliver(
    routes: &Routes,
    subscription_id: &str,
    message: SubscriptionMessage,
    out_tx: &mpsc::UnboundedSender<WsMessage>,
) {
    let tx = routes.lock().get(subscription_id).map(|r| r.tx.clone());
    let Some(tx) = tx else {
        return;
    };
    if tx.send(message).await.is_err() {
        // Receiver dropped: the consumer lost interest.
        routes.lock().remove(subscription_id);
        send_close(out_tx, subscription_id);
    }
}

fn send_close(out_tx: &mpsc::UnboundedSender<WsMessage>, subscription_id: &str) {
    let close = ClientMessage::Close(subscription_id.to_string());
    let _ = out_tx.send(WsMessage::Text(close.as_json().into()));
}

/// Creates [`WsRelayClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl RelayConnector for WsConnector {
    fn client(&self, url: &str) -> Arc<dyn RelayClient> {
        Arc::new(WsRelayClient::new(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_before_connect_fails() {
        let client = WsRelayClient::new("wss://relay.example.com");
        let err = client
            .subscribe(Filter::new().limit(1), SubscriptionMode::Live)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotConnected(url) if url == "wss://relay.example.com"));
    }

    #[tokio::test]
    async fn disconnected_resolves_when_never_connected() {
        let client = WsRelayClient::new("wss://relay.example.com");
        client.disconnected().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn one_shot_route_is_dropped_after_eose() {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(8);
        routes.lock().insert(
            "q1".into(),
            Route {
                tx,
                mode: SubscriptionMode::OneShot,
            },
        );

        let event = r#"["EVENT","q1",{"id":"aa","pubkey":"bb","created_at":1,"kind":1}]"#;
        handle_text("wss://r", event, &routes, &out_tx).await;
        handle_text("wss://r", r#"["EOSE","q1"]"#, &routes, &out_tx).await;

        assert!(matches!(rx.recv().await, Some(SubscriptionMessage::Event(ev)) if ev.id == "aa"));
        assert_eq!(rx.recv().await, Some(SubscriptionMessage::EndOfStream));
        assert_eq!(rx.recv().await, None);
        assert!(routes.lock().is_empty());

        match out_rx.recv().await {
            Some(WsMessage::Text(text)) => assert_eq!(text.as_str(), r#"["CLOSE","q1"]"#),
            other => panic!("expected CLOSE, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn live_route_survives_eose() {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(8);
        routes.lock().insert(
            "main".into(),
            Route {
                tx,
                mode: SubscriptionMode::Live,
            },
        );

        handle_text("wss://r", r#"["EOSE","main"]"#, &routes, &out_tx).await;
        assert_eq!(rx.recv().await, Some(SubscriptionMessage::EndOfStream));
        assert!(routes.lock().contains_key("main"));
    }
}
