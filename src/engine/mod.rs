//! The quote-feed engine: ingest, dedupe, resolve, order.

pub mod feed;
pub mod profiles;
pub mod resolver;
pub mod store;
pub mod view;

use nostr_core::{
    short_key, Event, Filter, IdentifierCodec, MentionFilter, MentionMode, KIND_METADATA,
    KIND_TEXT_NOTE,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use feed::{Feed, FeedOrder};
pub use profiles::{Profile, ProfileCache, UNKNOWN_USER};
pub use resolver::Resolver;
pub use store::EventStore;
pub use view::{FeedItem, FeedView};

use crate::notify::{Notification, Notifier};
use crate::relay::{RelayConnector, RelayDelivery, RelayPool, SubscriptionMessage};
use view::ViewSources;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_DISPLAYED: usize = 100;
pub const DEFAULT_PREVIEW_LENGTH: usize = 200;
pub const DEFAULT_SUBSCRIPTION_LIMIT: usize = 50;

/// Runtime settings, already validated and with the tracked author in hex.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub relays: Vec<String>,
    pub tracked_author: String,
    pub note_kind: u16,
    pub metadata_kind: u16,
    pub connect_timeout: Duration,
    pub max_displayed: usize,
    pub content_preview_length: usize,
    pub feed_order: FeedOrder,
    pub mention_mode: MentionMode,
    pub max_depth: Option<usize>,
    pub subscription_limit: usize,
}

impl Settings {
    pub fn new(relays: Vec<String>, tracked_author: impl Into<String>) -> Self {
        Self {
            relays,
            tracked_author: tracked_author.into(),
            note_kind: KIND_TEXT_NOTE,
            metadata_kind: KIND_METADATA,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_displayed: DEFAULT_MAX_DISPLAYED,
            content_preview_length: DEFAULT_PREVIEW_LENGTH,
            feed_order: FeedOrder::default(),
            mention_mode: MentionMode::default(),
            max_depth: None,
            subscription_limit: DEFAULT_SUBSCRIPTION_LIMIT,
        }
    }

    /// Live subscription for the tracked author's notes.
    pub fn primary_filter(&self) -> Filter {
        Filter::new()
            .kind(self.note_kind)
            .author(&self.tracked_author)
            .limit(self.subscription_limit)
    }
}

pub struct Engine {
    settings: Settings,
    mentions: MentionFilter,
    codec: Arc<dyn IdentifierCodec>,
    notifier: Arc<Notifier>,
    store: Arc<EventStore>,
    feed: Arc<Feed>,
    profiles: Arc<ProfileCache>,
    pool: Arc<RelayPool>,
    resolver: Resolver,
    started: AtomicBool,
    cancel: CancellationToken,
    ingest: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Wire up the components. Nothing touches the network until [`Engine::start`].
    pub fn new(
        settings: Settings,
        connector: Arc<dyn RelayConnector>,
        codec: Arc<dyn IdentifierCodec>,
    ) -> Arc<Self> {
        let notifier = Arc::new(Notifier::new());
        let store = Arc::new(EventStore::new());
        let feed = Arc::new(Feed::new(settings.feed_order, settings.max_displayed));
        let pool = Arc::new(RelayPool::new(
            connector,
            settings.connect_timeout,
            notifier.clone(),
        ));
        let profiles = Arc::new(ProfileCache::new(
            pool.clone(),
            notifier.clone(),
            settings.metadata_kind,
        ));
        let mentions = MentionFilter::new(settings.note_kind, settings.mention_mode);
        let resolver = Resolver::new(
            store.clone(),
            pool.clone(),
            profiles.clone(),
            feed.clone(),
            notifier.clone(),
            codec.clone(),
            mentions,
            settings.max_depth,
        );

        Arc::new(Self {
            settings,
            mentions,
            codec,
            notifier,
            store,
            feed,
            profiles,
            pool,
            resolver,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            ingest: Mutex::new(None),
        })
    }

    /// Connect to every relay and begin ingesting. Calling twice is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            "Tracking {} on {} relays",
            short_key(&self.settings.tracked_author),
            self.settings.relays.len()
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<RelayDelivery>();
        let engine = Arc::clone(self);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    delivery = rx.recv() => match delivery {
                        Some(delivery) => engine.ingest(delivery),
                        None => break,
                    }
                }
            }
            debug!("Ingest loop stopped");
        });
        *self.ingest.lock() = Some(handle);

        self.pool.subscribe(self.settings.primary_filter(), tx).await;
        self.pool.connect(&self.settings.relays);
    }

    /// Cancel every task and close every relay.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.pool.close().await;
        let handle = self.ingest.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Engine stopped with {} notes stored", self.store.len());
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn profiles(&self) -> &ProfileCache {
        &self.profiles
    }

    pub fn connected_relays(&self) -> usize {
        self.pool.connected_count()
    }

    pub fn view(&self) -> FeedView {
        let sources = ViewSources {
            feed: &self.feed,
            store: &self.store,
            profiles: &self.profiles,
            codec: self.codec.as_ref(),
            preview_length: self.settings.content_preview_length,
        };
        FeedView::build(&sources, self.pool.connected_count())
    }

    fn ingest(&self, delivery: RelayDelivery) {
        match delivery.message {
            SubscriptionMessage::EndOfStream => debug!("EOSE from {}", delivery.relay),
            SubscriptionMessage::Event(event) => self.handle_note(event, &delivery.relay),
        }
    }

    fn handle_note(&self, event: Event, relay: &str) {
        if event.pubkey != self.settings.tracked_author {
            debug!("Skipping {} from {relay}: not the tracked author", event.id);
            return;
        }
        if !self.mentions.is_qualifying(&event) {
            debug!("Skipping {} from {relay}: not a mention event", event.id);
            return;
        }

        let id = event.id.clone();
        let author = event.pubkey.clone();
        let created_at = event.created_at;
        let quoted = self.mentions.mentioned_id(&event).map(str::to_string);

        if !self.store.put(event) {
            debug!("Already have {id}");
            return;
        }
        debug!("Stored note {id} from {relay}");

        self.notifier.set_note_count(self.store.len());
        self.feed.add_top_level(&id, created_at, quoted.as_deref());
        self.notifier.send(Notification::FeedChanged);
        self.profiles.ensure_fetched(&author);

        if let Some(stored) = self.store.get(&id) {
            self.resolver.resolve(&stored, 0);
        }
    }
}
