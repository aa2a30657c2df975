//! Inline `nostr:nevent…` references embedded in note content.
//!
//! Every token matching the reference pattern is removed from the display
//! text. Only tokens that pass the syntactic checks *and* decode cleanly end
//! up in [`ParsedContent::references`]; the rest are dropped silently.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::codec::IdentifierCodec;

/// Matches `nostr:nevent` followed by anything up to the next whitespace.
static NEVENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"nostr:nevent\S*").expect("nevent regex should compile"));

const NEVENT_PREFIX: &str = "nostr:nevent";
/// Shortest token (prefix included) worth handing to the decoder.
const MIN_TOKEN_LEN: usize = 21;
/// Shortest bech32 payload after the `nostr:nevent` prefix.
const MIN_PAYLOAD_LEN: usize = 10;

/// A decoded reference to another event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineReference {
    pub token: String,
    pub event_id: String,
}

/// Display text with references stripped, plus the valid references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedContent {
    pub clean: String,
    pub references: Vec<InlineReference>,
}

/// Syntactic pre-check done before any decoding is attempted.
pub fn is_plausible_reference(token: &str) -> bool {
    if token.len() < MIN_TOKEN_LEN {
        return false;
    }
    match token.strip_prefix(NEVENT_PREFIX) {
        Some(payload) => {
            payload.len() >= MIN_PAYLOAD_LEN && payload.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Split note content into display text and decoded inline references.
///
/// Duplicate references to the same event are collapsed to the first one.
pub fn parse_content(content: &str, codec: &dyn IdentifierCodec) -> ParsedContent {
    let mut clean = String::with_capacity(content.len());
    let mut references: Vec<InlineReference> = Vec::new();
    let mut last = 0;

    for m in NEVENT_RE.find_iter(content) {
        clean.push_str(&content[last..m.start()]);
        last = m.end();

        let token = m.as_str();
        if !is_plausible_reference(token) {
            debug!("Skipping malformed nevent reference: {token}");
            continue;
        }
        match codec.decode_event_reference(token) {
            Ok(event_id) => {
                if references.iter().all(|r| r.event_id != event_id) {
                    references.push(InlineReference {
                        token: token.to_string(),
                        event_id,
                    });
                }
            }
            Err(e) => debug!("Skipping undecodable nevent {token}: {e}"),
        }
    }
    clean.push_str(&content[last..]);

    ParsedContent {
        clean: clean.trim().to_string(),
        references,
    }
}

/// Truncate display text to `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Short label for an author whose profile is not known yet.
pub fn short_key(pubkey: &str) -> String {
    let end = pubkey
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(pubkey.len());
    format!("{}...", &pubkey[..end])
}

/// Generated avatar for authors without a profile picture.
pub fn fallback_avatar_url(pubkey: &str) -> String {
    format!("https://api.dicebear.com/7.x/pixel-art/svg?seed={pubkey}")
}

/// Human-readable UTC timestamp for `created_at` seconds.
pub fn format_timestamp(created_at: u64) -> String {
    i64::try_from(created_at)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| created_at.to_string())
}
