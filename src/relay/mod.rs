//! Relay client abstraction, WebSocket implementation and the relay pool.

pub mod pool;
pub mod ws;

use async_trait::async_trait;
use futures_util::Stream;
use nostr_core::{Event, Filter};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;

pub use pool::{RelayDelivery, RelayPool};
pub use ws::{WsConnector, WsRelayClient};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("relay {0} is not connected")]
    NotConnected(String),
}

/// Lifetime of a subscription on a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Stays open after end-of-stored-events for live updates.
    Live,
    /// Closed on the relay once it signals end-of-stored-events.
    OneShot,
}

/// Item yielded by a [`Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionMessage {
    Event(Event),
    EndOfStream,
}

/// Async stream of messages for one subscription on one relay.
///
/// Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    rx: mpsc::Receiver<SubscriptionMessage>,
}

impl Subscription {
    pub fn new(id: impl Into<String>, rx: mpsc::Receiver<SubscriptionMessage>) -> Self {
        Self { id: id.into(), rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Stream for Subscription {
    type Item = SubscriptionMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// One connection to one relay endpoint.
#[async_trait]
pub trait RelayClient: Send + Sync {
    fn url(&self) -> &str;

    async fn connect(&self) -> Result<(), RelayError>;

    async fn subscribe(
        &self,
        filter: Filter,
        mode: SubscriptionMode,
    ) -> Result<Subscription, RelayError>;

    async fn close(&self);

    /// Resolves once the connection is gone (or was never established).
    async fn disconnected(&self);
}

/// Builds a client for a relay endpoint.
pub trait RelayConnector: Send + Sync {
    fn client(&self, url: &str) -> Arc<dyn RelayClient>;
}
