//! Subscription filters (NIP-01 `REQ` payloads).

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// A relay query. Empty lists mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event satisfies every constraint of this filter.
    ///
    /// `limit` only caps how many stored events a relay returns, so it is
    /// ignored here.
    pub fn matches(&self, event: &Event) -> bool {
        (self.ids.is_empty() || self.ids.iter().any(|id| *id == event.id))
            && (self.authors.is_empty() || self.authors.iter().any(|a| *a == event.pubkey))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
    }

    /// True when this is a lookup of specific event ids.
    pub fn is_id_lookup(&self) -> bool {
        !self.ids.is_empty()
    }
}
