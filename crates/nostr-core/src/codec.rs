//! Identifier codec: human-readable NIP-19 strings ↔ raw hex identifiers.

use nostr_sdk::nips::nip19::{FromBech32, Nip19};
use nostr_sdk::PublicKey;
use thiserror::Error;

/// URI scheme prefix used for inline references in note content.
pub const NOSTR_URI_PREFIX: &str = "nostr:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("invalid event reference: {0}")]
    InvalidReference(String),
    #[error("reference does not point to an event")]
    NotAnEvent,
}

/// Decoder for identity keys and inline event references.
pub trait IdentifierCodec: Send + Sync {
    /// Decode an `npub1…` (or raw hex) identity into a hex public key.
    fn decode_identity(&self, identity: &str) -> Result<String, CodecError>;

    /// Decode a `nostr:nevent1…` token (prefix optional) into a hex event id.
    fn decode_event_reference(&self, token: &str) -> Result<String, CodecError>;
}

/// NIP-19 codec backed by `nostr-sdk`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nip19Codec;

impl IdentifierCodec for Nip19Codec {
    fn decode_identity(&self, identity: &str) -> Result<String, CodecError> {
        let identity = identity.trim();
        let identity = identity.strip_prefix(NOSTR_URI_PREFIX).unwrap_or(identity);
        if identity.starts_with("npub1") {
            return PublicKey::from_bech32(identity)
                .map(|pk| pk.to_hex())
                .map_err(|e| CodecError::InvalidIdentity(e.to_string()));
        }
        PublicKey::from_hex(identity)
            .map(|pk| pk.to_hex())
            .map_err(|e| CodecError::InvalidIdentity(e.to_string()))
    }

    fn decode_event_reference(&self, token: &str) -> Result<String, CodecError> {
        let bech32 = token.strip_prefix(NOSTR_URI_PREFIX).unwrap_or(token);
        match Nip19::from_bech32(bech32) {
            Ok(Nip19::Event(event)) => Ok(event.event_id.to_hex()),
            Ok(Nip19::EventId(id)) => Ok(id.to_hex()),
            Ok(_) => Err(CodecError::NotAnEvent),
            Err(e) => Err(CodecError::InvalidReference(e.to_string())),
        }
    }
}
