//! Read-only snapshot of the feed for rendering.

use nostr_core::{format_timestamp, parse_content, preview, IdentifierCodec};
use serde::Serialize;
use std::collections::HashSet;

use super::feed::Feed;
use super::profiles::ProfileCache;
use super::store::EventStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub id: String,
    pub author: String,
    pub author_label: String,
    pub avatar_url: String,
    pub created_at: u64,
    pub timestamp: String,
    pub preview: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedView {
    pub relays: usize,
    pub notes: usize,
    pub items: Vec<FeedItem>,
}

pub(crate) struct ViewSources<'a> {
    pub feed: &'a Feed,
    pub store: &'a EventStore,
    pub profiles: &'a ProfileCache,
    pub codec: &'a dyn IdentifierCodec,
    pub preview_length: usize,
}

impl FeedView {
    pub(crate) fn build(sources: &ViewSources<'_>, relays: usize) -> Self {
        let items = sources
            .feed
            .top_level_ids()
            .iter()
            .filter_map(|id| item(sources, id, &mut HashSet::new()))
            .collect();
        Self {
            relays,
            notes: sources.store.len(),
            items,
        }
    }

    /// Total number of items in the tree, nested ones included.
    pub fn item_count(&self) -> usize {
        fn count(items: &[FeedItem]) -> usize {
            items.iter().map(|i| 1 + count(&i.children)).sum()
        }
        count(&self.items)
    }
}

/// `path` holds the ancestors of `id`, so a reference loop renders once.
fn item(sources: &ViewSources<'_>, id: &str, path: &mut HashSet<String>) -> Option<FeedItem> {
    let event = sources.store.get(id)?;
    if !path.insert(id.to_string()) {
        return None;
    }

    let clean = parse_content(&event.content, sources.codec).clean;
    let children = sources
        .feed
        .children(id)
        .iter()
        .filter_map(|child| item(sources, child, path))
        .collect();
    path.remove(id);

    Some(FeedItem {
        id: event.id.clone(),
        author: event.pubkey.clone(),
        author_label: sources.profiles.display_label(&event.pubkey),
        avatar_url: sources.profiles.avatar_url(&event.pubkey),
        created_at: event.created_at,
        timestamp: format_timestamp(event.created_at),
        preview: preview(&clean, sources.preview_length),
        children,
    })
}
