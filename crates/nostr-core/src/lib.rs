//! Shared Nostr protocol functionality for quotefeed
//!
//! This crate holds the pure, I/O-free parts of the pipeline: the typed
//! event model, relay wire messages, subscription filters, mention
//! detection, inline reference extraction and the NIP-19 identifier codec.

pub mod codec;
pub mod content;
pub mod event;
pub mod filter;
pub mod mention;
pub mod message;

// Re-export commonly used types
pub use codec::{CodecError, IdentifierCodec, Nip19Codec, NOSTR_URI_PREFIX};
pub use content::{
    fallback_avatar_url, format_timestamp, is_plausible_reference, parse_content, preview,
    short_key, InlineReference, ParsedContent,
};
pub use event::{Event, EventError, Tag, KIND_METADATA, KIND_TEXT_NOTE, MENTION_MARKER};
pub use filter::Filter;
pub use mention::{looks_like_relay_url, MentionFilter, MentionMode};
pub use message::{ClientMessage, MessageError, RelayMessage};

// Re-export nostr-sdk for convenience
pub use nostr_sdk;
