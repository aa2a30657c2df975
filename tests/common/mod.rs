//! In-memory relays for exercising the pool and engine without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use nostr_core::{
    CodecError, Event, Filter, IdentifierCodec, Tag, KIND_METADATA, KIND_TEXT_NOTE,
};
use parking_lot::Mutex;
use quotefeed::relay::{
    RelayClient, RelayConnector, RelayError, Subscription, SubscriptionMessage, SubscriptionMode,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const TRACKED: &str = "tracked0author";
pub const HINT: &str = "wss://relay.example.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    Refuse,
    Hang,
}

/// A relay that answers queries from a fixed library of events.
pub struct MockRelay {
    url: String,
    behavior: ConnectBehavior,
    library: Mutex<Vec<Event>>,
    requests: Mutex<Vec<(Filter, SubscriptionMode)>>,
    live: Mutex<Vec<mpsc::Sender<SubscriptionMessage>>>,
    connected: watch::Sender<bool>,
    closed: AtomicBool,
    next_sub: AtomicU64,
}

impl MockRelay {
    pub fn new(url: &str) -> Arc<Self> {
        Self::with_behavior(url, ConnectBehavior::Accept)
    }

    pub fn with_behavior(url: &str, behavior: ConnectBehavior) -> Arc<Self> {
        let (connected, _) = watch::channel(false);
        Arc::new(Self {
            url: url.to_string(),
            behavior,
            library: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            live: Mutex::new(Vec::new()),
            connected,
            closed: AtomicBool::new(false),
            next_sub: AtomicU64::new(0),
        })
    }

    /// Make an event available to queries.
    pub fn add(&self, event: Event) {
        self.library.lock().push(event);
    }

    /// Push an event to every open live subscription.
    pub async fn deliver(&self, event: Event) {
        let senders = self.live.lock().clone();
        for tx in senders {
            let _ = tx.send(SubscriptionMessage::Event(event.clone())).await;
        }
    }

    /// Simulate the remote end dropping the socket.
    pub fn drop_connection(&self) {
        self.live.lock().clear();
        self.connected.send_replace(false);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(_, mode)| *mode == SubscriptionMode::Live)
            .count()
    }

    /// One-shot queries asking for this event id.
    pub fn id_queries(&self, id: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(f, mode)| {
                *mode == SubscriptionMode::OneShot && f.ids.iter().any(|i| i == id)
            })
            .count()
    }

    /// One-shot metadata queries for this author.
    pub fn profile_queries(&self, author: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(f, _)| {
                f.kinds.contains(&KIND_METADATA) && f.authors.iter().any(|a| a == author)
            })
            .count()
    }

    pub fn note_queries(&self) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(f, mode)| *mode == SubscriptionMode::OneShot && f.is_id_lookup())
            .count()
    }

    pub fn requests(&self) -> Vec<(Filter, SubscriptionMode)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RelayClient for MockRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<(), RelayError> {
        match self.behavior {
            ConnectBehavior::Accept => {
                self.connected.send_replace(true);
                Ok(())
            }
            ConnectBehavior::Refuse => Err(RelayError::Connect {
                url: self.url.clone(),
                reason: "connection refused".into(),
            }),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    async fn subscribe(
        &self,
        filter: Filter,
        mode: SubscriptionMode,
    ) -> Result<Subscription, RelayError> {
        if !self.is_connected() {
            return Err(RelayError::NotConnected(self.url.clone()));
        }
        self.requests.lock().push((filter.clone(), mode));

        let matching: Vec<Event> = {
            let library = self.library.lock();
            let limit = filter.limit.unwrap_or(usize::MAX);
            library
                .iter()
                .filter(|e| filter.matches(e))
                .take(limit)
                .cloned()
                .collect()
        };

        let (tx, rx) = mpsc::channel(matching.len() + 64);
        for event in matching {
            let _ = tx.try_send(SubscriptionMessage::Event(event));
        }
        let _ = tx.try_send(SubscriptionMessage::EndOfStream);
        if mode == SubscriptionMode::Live {
            self.live.lock().push(tx);
        }

        let id = format!("mock-{}", self.next_sub.fetch_add(1, Ordering::Relaxed));
        Ok(Subscription::new(id, rx))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.live.lock().clear();
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

/// Hands out pre-built mock relays by URL; unknown URLs refuse to connect.
#[derive(Default)]
pub struct MockConnector {
    relays: HashMap<String, Arc<MockRelay>>,
}

impl MockConnector {
    pub fn new(relays: &[Arc<MockRelay>]) -> Arc<Self> {
        Arc::new(Self {
            relays: relays.iter().map(|r| (r.url.clone(), r.clone())).collect(),
        })
    }
}

impl RelayConnector for MockConnector {
    fn client(&self, url: &str) -> Arc<dyn RelayClient> {
        match self.relays.get(url) {
            Some(relay) => relay.clone(),
            None => MockRelay::with_behavior(url, ConnectBehavior::Refuse),
        }
    }
}

/// Decodes `nostr:nevent1<id>` to `<id>`; payloads containing "bad" fail.
pub struct TestCodec;

impl IdentifierCodec for TestCodec {
    fn decode_identity(&self, identity: &str) -> Result<String, CodecError> {
        Ok(identity.to_string())
    }

    fn decode_event_reference(&self, token: &str) -> Result<String, CodecError> {
        let payload = token.trim_start_matches("nostr:nevent1");
        if payload.contains("bad") {
            Err(CodecError::InvalidReference("bad checksum".into()))
        } else {
            Ok(payload.to_string())
        }
    }
}

pub fn inline_ref(id: &str) -> String {
    format!("nostr:nevent1{id}")
}

/// A tracked-author note quoting `quoted` through a mention tag.
pub fn quote(id: &str, created_at: u64, quoted: &str, content: &str) -> Event {
    Event::new(id, TRACKED, created_at, KIND_TEXT_NOTE, content)
        .with_tag(Tag::mention(quoted, HINT))
}

pub fn note(id: &str, author: &str, created_at: u64, content: &str) -> Event {
    Event::new(id, author, created_at, KIND_TEXT_NOTE, content)
}

pub fn metadata(author: &str, created_at: u64, content: &str) -> Event {
    Event::new(format!("meta{author}"), author, created_at, KIND_METADATA, content)
}

/// Poll `cond` until it holds, panicking after two seconds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Give spawned tasks a moment to run out of work.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
