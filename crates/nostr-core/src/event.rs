//! Typed Nostr event model.
//!
//! Relays hand us loosely shaped JSON. Everything is converted into [`Event`]
//! and [`Tag`] at the boundary so the rest of the workspace never pokes at
//! arrays of unknown arity. Malformed events are rejected with an
//! [`EventError`]; malformed tags are kept as [`Tag::Other`] so they simply
//! never match anything.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Kind 0: user metadata.
pub const KIND_METADATA: u16 = 0;
/// Kind 1: short text note.
pub const KIND_TEXT_NOTE: u16 = 1;

/// Marker value used in position 3 of an `e` tag to flag a quote.
pub const MENTION_MARKER: &str = "mention";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event is missing an id")]
    MissingId,
    #[error("event is missing an author key")]
    MissingAuthor,
    #[error("malformed event: {0}")]
    Malformed(String),
}

/// A single event tag.
///
/// `e` tags with a non-empty target are parsed into [`Tag::Event`]; every
/// other shape is preserved verbatim in [`Tag::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum Tag {
    Event {
        target: String,
        relay_hint: Option<String>,
        marker: Option<String>,
        extra: Vec<String>,
    },
    Other(Vec<String>),
}

impl Tag {
    /// Build an `e` tag carrying the `mention` marker.
    pub fn mention(target: impl Into<String>, relay_hint: impl Into<String>) -> Self {
        Tag::Event {
            target: target.into(),
            relay_hint: Some(relay_hint.into()),
            marker: Some(MENTION_MARKER.to_string()),
            extra: Vec::new(),
        }
    }

    /// Build a plain `e` tag with only a target.
    pub fn event(target: impl Into<String>) -> Self {
        Tag::Event {
            target: target.into(),
            relay_hint: None,
            marker: None,
            extra: Vec::new(),
        }
    }

    /// Target id for `e` tags.
    pub fn event_target(&self) -> Option<&str> {
        match self {
            Tag::Event { target, .. } => Some(target),
            Tag::Other(_) => None,
        }
    }

    pub fn relay_hint(&self) -> Option<&str> {
        match self {
            Tag::Event { relay_hint, .. } => relay_hint.as_deref(),
            Tag::Other(_) => None,
        }
    }

    pub fn marker(&self) -> Option<&str> {
        match self {
            Tag::Event { marker, .. } => marker.as_deref(),
            Tag::Other(_) => None,
        }
    }

    /// True for `["e", target, hint, "mention", ...]`.
    pub fn is_mention(&self) -> bool {
        self.marker() == Some(MENTION_MARKER)
    }
}

impl From<Vec<String>> for Tag {
    fn from(mut parts: Vec<String>) -> Self {
        let is_event = parts.first().map(String::as_str) == Some("e")
            && parts.get(1).is_some_and(|t| !t.is_empty());
        if !is_event {
            return Tag::Other(parts);
        }

        let extra = if parts.len() > 4 {
            parts.split_off(4)
        } else {
            Vec::new()
        };
        let mut rest = parts.into_iter().skip(1);
        let target = rest.next().unwrap_or_default();
        let relay_hint = rest.next();
        let marker = rest.next();
        Tag::Event {
            target,
            relay_hint,
            marker,
            extra,
        }
    }
}

impl From<Tag> for Vec<String> {
    fn from(tag: Tag) -> Self {
        match tag {
            Tag::Event {
                target,
                relay_hint,
                marker,
                extra,
            } => {
                let mut out = vec!["e".to_string(), target];
                match (relay_hint, marker) {
                    (Some(hint), Some(marker)) => {
                        out.push(hint);
                        out.push(marker);
                    }
                    (None, Some(marker)) => {
                        out.push(String::new());
                        out.push(marker);
                    }
                    (Some(hint), None) => out.push(hint),
                    (None, None) => {}
                }
                out.extend(extra);
                out
            }
            Tag::Other(parts) => parts,
        }
    }
}

/// A received event. Never mutated after parsing.
///
/// ```json
/// {
///   "id": "5c83…",
///   "pubkey": "59e2…",
///   "created_at": 1700000000,
///   "kind": 1,
///   "tags": [["e", "abc123", "wss://relay.damus.io", "mention"]],
///   "content": "look at this",
///   "sig": "…"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// Wire shape accepted from relays before validation.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    pubkey: String,
    #[serde(default)]
    created_at: u64,
    kind: u16,
    #[serde(default)]
    tags: Vec<Value>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    sig: Option<String>,
}

impl TryFrom<RawEvent> for Event {
    type Error = EventError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err(EventError::MissingId);
        }
        if raw.pubkey.trim().is_empty() {
            return Err(EventError::MissingAuthor);
        }

        // Tags that are not arrays of strings are dropped rather than failing
        // the whole event.
        let tags = raw
            .tags
            .into_iter()
            .filter_map(|value| serde_json::from_value::<Vec<String>>(value).ok())
            .map(Tag::from)
            .collect();

        Ok(Event {
            id: raw.id,
            pubkey: raw.pubkey,
            created_at: raw.created_at,
            kind: raw.kind,
            tags,
            content: raw.content,
            sig: raw.sig,
        })
    }
}

impl Event {
    /// Construct an unsigned event. Mostly useful for tests and fixtures.
    pub fn new(
        id: impl Into<String>,
        pubkey: impl Into<String>,
        created_at: u64,
        kind: u16,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags: Vec::new(),
            content: content.into(),
            sig: None,
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Parse and validate an event from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        serde_json::from_value(value).map_err(|e| EventError::Malformed(e.to_string()))
    }

    /// Parse and validate an event from JSON text.
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        serde_json::from_str(json).map_err(|e| EventError::Malformed(e.to_string()))
    }
}
