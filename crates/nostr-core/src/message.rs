//! NIP-01 relay wire messages.
//!
//! Relay → client: `EVENT`, `EOSE`, `NOTICE`, `CLOSED`, `OK`, `AUTH`.
//! Client → relay: `REQ`, `CLOSE`.

use serde_json::{json, Value};
use thiserror::Error;

use crate::event::{Event, EventError};
use crate::filter::Filter;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("relay message is not a non-empty array")]
    NotAnArray,
    #[error("unknown relay message type: {0}")]
    UnknownType(String),
    #[error("malformed {0} message")]
    Malformed(&'static str),
    #[error("invalid event: {0}")]
    Event(#[from] EventError),
}

/// A message received from a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Event,
    },
    EndOfStoredEvents(String),
    Notice(String),
    Closed {
        subscription_id: String,
        message: String,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Auth(String),
}

impl RelayMessage {
    pub fn from_json(text: &str) -> Result<Self, MessageError> {
        let parsed: Value = serde_json::from_str(text)?;
        let arr = match parsed.as_array() {
            Some(a) if !a.is_empty() => a,
            _ => return Err(MessageError::NotAnArray),
        };

        let msg_type = arr[0].as_str().ok_or(MessageError::NotAnArray)?;
        let str_at = |idx: usize| arr.get(idx).and_then(|v| v.as_str());

        match msg_type {
            "EVENT" => {
                let subscription_id = str_at(1).ok_or(MessageError::Malformed("EVENT"))?;
                let raw = arr.get(2).ok_or(MessageError::Malformed("EVENT"))?;
                let event = Event::from_value(raw.clone())?;
                Ok(RelayMessage::Event {
                    subscription_id: subscription_id.to_string(),
                    event,
                })
            }
            "EOSE" => {
                let subscription_id = str_at(1).ok_or(MessageError::Malformed("EOSE"))?;
                Ok(RelayMessage::EndOfStoredEvents(subscription_id.to_string()))
            }
            "NOTICE" => Ok(RelayMessage::Notice(str_at(1).unwrap_or("").to_string())),
            "CLOSED" => {
                let subscription_id = str_at(1).ok_or(MessageError::Malformed("CLOSED"))?;
                Ok(RelayMessage::Closed {
                    subscription_id: subscription_id.to_string(),
                    message: str_at(2).unwrap_or("").to_string(),
                })
            }
            "OK" => {
                let event_id = str_at(1).ok_or(MessageError::Malformed("OK"))?;
                let accepted = arr
                    .get(2)
                    .and_then(|v| v.as_bool())
                    .ok_or(MessageError::Malformed("OK"))?;
                Ok(RelayMessage::Ok {
                    event_id: event_id.to_string(),
                    accepted,
                    message: str_at(3).unwrap_or("").to_string(),
                })
            }
            "AUTH" => Ok(RelayMessage::Auth(str_at(1).unwrap_or("").to_string())),
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }
}

/// A message sent to a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Req {
        subscription_id: String,
        filter: Filter,
    },
    Close(String),
}

impl ClientMessage {
    pub fn as_json(&self) -> String {
        match self {
            ClientMessage::Req {
                subscription_id,
                filter,
            } => json!(["REQ", subscription_id, filter]).to_string(),
            ClientMessage::Close(subscription_id) => json!(["CLOSE", subscription_id]).to_string(),
        }
    }
}
