//! Recursive resolution of mentioned and inline-referenced events.
//!
//! Each stored event fans out into point queries for its tag-mention and
//! its inline `nostr:nevent` references. Responses go through the store's
//! at-most-once insert, and only a fresh insert recurses, so cycles and
//! repeated deliveries terminate.

use nostr_core::{parse_content, Event, Filter, IdentifierCodec, MentionFilter};
use std::sync::Arc;
use tracing::debug;

use super::feed::Feed;
use super::profiles::ProfileCache;
use super::store::EventStore;
use crate::notify::{Notification, Notifier};
use crate::relay::{RelayPool, SubscriptionMessage};

#[derive(Clone)]
pub struct Resolver {
    store: Arc<EventStore>,
    pool: Arc<RelayPool>,
    profiles: Arc<ProfileCache>,
    feed: Arc<Feed>,
    notifier: Arc<Notifier>,
    codec: Arc<dyn IdentifierCodec>,
    mentions: MentionFilter,
    max_depth: Option<usize>,
}

impl Resolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<EventStore>,
        pool: Arc<RelayPool>,
        profiles: Arc<ProfileCache>,
        feed: Arc<Feed>,
        notifier: Arc<Notifier>,
        codec: Arc<dyn IdentifierCodec>,
        mentions: MentionFilter,
        max_depth: Option<usize>,
    ) -> Self {
        Self {
            store,
            pool,
            profiles,
            feed,
            notifier,
            codec,
            mentions,
            max_depth,
        }
    }

    /// Fetch everything `parent` references. `depth` is 0 for top-level events.
    pub fn resolve(&self, parent: &Event, depth: usize) {
        if self.max_depth.is_some_and(|max| depth >= max) {
            debug!("Not resolving references of {} beyond depth {depth}", parent.id);
            return;
        }

        let tag_target = self.mentions.mentioned_id(parent);
        if let Some(target) = tag_target {
            self.fetch(&parent.id, target, depth);
        }

        let parsed = parse_content(&parent.content, self.codec.as_ref());
        for reference in parsed.references {
            if tag_target == Some(reference.event_id.as_str()) {
                debug!(
                    "Inline reference {} already fetched via mention tag",
                    reference.event_id
                );
                continue;
            }
            self.fetch(&parent.id, &reference.event_id, depth);
        }
    }

    fn fetch(&self, parent_id: &str, target: &str, depth: usize) {
        if target == parent_id {
            return;
        }
        if self.store.has(target) {
            if self.feed.attach_child(parent_id, target) {
                self.notifier.send(Notification::FeedChanged);
            }
            return;
        }

        debug!("Fetching {target} referenced by {parent_id}");
        let filter = Filter::new()
            .kind(self.mentions.note_kind)
            .id(target)
            .limit(1);
        let mut rx = self.pool.query(filter);

        let resolver = self.clone();
        let parent_id = parent_id.to_string();
        let target = target.to_string();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let SubscriptionMessage::Event(event) = delivery.message else {
                    continue;
                };
                if event.id != target {
                    debug!(
                        "Discarding {} from {}: requested {target}",
                        event.id, delivery.relay
                    );
                    continue;
                }
                resolver.on_resolved(&parent_id, event, depth);
            }
        });
    }

    fn on_resolved(&self, parent_id: &str, event: Event, depth: usize) {
        let id = event.id.clone();
        let author = event.pubkey.clone();

        if !self.store.put(event) {
            if self.feed.attach_child(parent_id, &id) {
                self.notifier.send(Notification::FeedChanged);
            }
            return;
        }

        self.notifier.set_note_count(self.store.len());
        self.feed.attach_child(parent_id, &id);
        self.notifier.send(Notification::FeedChanged);
        self.profiles.ensure_fetched(&author);

        if let Some(stored) = self.store.get(&id) {
            self.resolve(&stored, depth + 1);
        }
    }
}
