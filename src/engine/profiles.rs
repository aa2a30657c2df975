//! Per-author profile metadata.
//!
//! Each author gets at most one outstanding metadata query. A pending entry
//! with no answer stays pending; it is never retried.

use nostr_core::{fallback_avatar_url, short_key, Event, Filter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::notify::{Notification, Notifier};
use crate::relay::{RelayPool, SubscriptionMessage};

/// Label used when metadata exists but names nobody.
pub const UNKNOWN_USER: &str = "Unknown User";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// `created_at` of the metadata event, 0 for the placeholder.
    pub created_at: u64,
    pub placeholder: bool,
}

/// Fields we read from kind-0 content.
#[derive(Debug, Deserialize)]
struct Metadata {
    name: Option<String>,
    display_name: Option<String>,
    picture: Option<String>,
}

impl Profile {
    pub fn placeholder() -> Self {
        Self {
            placeholder: true,
            ..Self::default()
        }
    }

    /// Parse a metadata event. Unparseable content yields the placeholder.
    pub fn from_metadata(event: &Event) -> Self {
        match serde_json::from_str::<Metadata>(&event.content) {
            Ok(meta) => Self {
                display_name: non_empty(meta.name).or_else(|| non_empty(meta.display_name)),
                avatar_url: non_empty(meta.picture),
                created_at: event.created_at,
                placeholder: false,
            },
            Err(e) => {
                debug!("Bad profile metadata from {}: {e}", event.pubkey);
                Self::placeholder()
            }
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(UNKNOWN_USER)
    }

    /// Whether `incoming` should overwrite `self`.
    fn superseded_by(&self, incoming: &Profile) -> bool {
        match (self.placeholder, incoming.placeholder) {
            (_, true) => false,
            (true, false) => true,
            (false, false) => incoming.created_at > self.created_at,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
enum ProfileEntry {
    Pending,
    Ready(Profile),
}

pub struct ProfileCache {
    entries: Mutex<HashMap<String, ProfileEntry>>,
    pool: Arc<RelayPool>,
    notifier: Arc<Notifier>,
    metadata_kind: u16,
}

impl ProfileCache {
    pub fn new(pool: Arc<RelayPool>, notifier: Arc<Notifier>, metadata_kind: u16) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            pool,
            notifier,
            metadata_kind,
        }
    }

    /// Issue a metadata query for `author` unless one was already issued.
    pub fn ensure_fetched(self: &Arc<Self>, author: &str) {
        {
            let mut entries = self.entries.lock();
            if entries.contains_key(author) {
                return;
            }
            entries.insert(author.to_string(), ProfileEntry::Pending);
        }

        debug!("Fetching profile for {author}");
        let filter = Filter::new()
            .kind(self.metadata_kind)
            .author(author)
            .limit(1);
        let mut rx = self.pool.query(filter);
        let cache = Arc::clone(self);
        let author = author.to_string();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let SubscriptionMessage::Event(event) = delivery.message else {
                    continue;
                };
                if event.pubkey != author || event.kind != cache.metadata_kind {
                    debug!("Discarding unrequested metadata {} from {}", event.id, delivery.relay);
                    continue;
                }
                cache.store(&author, Profile::from_metadata(&event));
            }
        });
    }

    /// Store a profile, keeping the newest real one. Returns whether it changed.
    pub fn store(&self, author: &str, profile: Profile) -> bool {
        let changed = {
            let mut entries = self.entries.lock();
            match entries.get(author) {
                Some(ProfileEntry::Ready(existing)) if !existing.superseded_by(&profile) => false,
                _ => {
                    entries.insert(author.to_string(), ProfileEntry::Ready(profile));
                    true
                }
            }
        };
        if changed {
            info!("Profile resolved for {}", short_key(author));
            self.notifier
                .send(Notification::ProfileResolved(author.to_string()));
        }
        changed
    }

    pub fn get(&self, author: &str) -> Option<Profile> {
        match self.entries.lock().get(author) {
            Some(ProfileEntry::Ready(profile)) => Some(profile.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    fn is_known(&self, author: &str) -> bool {
        self.entries.lock().contains_key(author)
    }

    /// Profile name, or a shortened key while unresolved.
    pub fn display_label(&self, author: &str) -> String {
        match self.get(author) {
            Some(profile) => profile.label().to_string(),
            None => short_key(author),
        }
    }

    pub fn avatar_url(&self, author: &str) -> String {
        self.get(author)
            .and_then(|p| p.avatar_url)
            .unwrap_or_else(|| fallback_avatar_url(author))
    }
}
