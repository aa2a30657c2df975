//! Mention detection logic for Nostr events.
//!
//! A "mention event" is a text note carrying at least one
//! `["e", <target>, <relay hint>, "mention"]` tag, i.e. the author explicitly
//! quoted another note. Replies and plain posts never qualify.

use serde::{Deserialize, Serialize};

use crate::event::{Event, Tag, KIND_TEXT_NOTE};

/// How picky to be about the relay hint of a mention tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionMode {
    /// Any 4+ position `e` tag with the `mention` marker.
    #[default]
    Lenient,
    /// Additionally require the relay hint to be a `ws://` or `wss://` URL.
    Strict,
}

/// Structural filter deciding which events are trackable quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentionFilter {
    pub note_kind: u16,
    pub mode: MentionMode,
}

impl Default for MentionFilter {
    fn default() -> Self {
        Self {
            note_kind: KIND_TEXT_NOTE,
            mode: MentionMode::Lenient,
        }
    }
}

impl MentionFilter {
    pub fn new(note_kind: u16, mode: MentionMode) -> Self {
        Self { note_kind, mode }
    }

    /// True iff the event is a note with at least one qualifying mention tag.
    pub fn is_qualifying(&self, event: &Event) -> bool {
        event.kind == self.note_kind && self.mentioned_id(event).is_some()
    }

    /// Target of the first qualifying mention tag.
    pub fn mentioned_id<'a>(&self, event: &'a Event) -> Option<&'a str> {
        event
            .tags
            .iter()
            .find(|tag| self.tag_matches(tag))
            .and_then(Tag::event_target)
    }

    fn tag_matches(&self, tag: &Tag) -> bool {
        if !tag.is_mention() {
            return false;
        }
        match self.mode {
            MentionMode::Lenient => true,
            MentionMode::Strict => tag.relay_hint().is_some_and(looks_like_relay_url),
        }
    }
}

/// Cheap syntactic check for a relay endpoint.
pub fn looks_like_relay_url(hint: &str) -> bool {
    let rest = hint
        .strip_prefix("wss://")
        .or_else(|| hint.strip_prefix("ws://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.contains(char::is_whitespace))
}
