//! In-memory deduplicated event store.

use nostr_core::Event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Canonical id → event map. Insert is at-most-once per id.
#[derive(Debug, Default)]
pub struct EventStore {
    events: Mutex<HashMap<String, Arc<Event>>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, id: &str) -> bool {
        self.events.lock().contains_key(id)
    }

    /// Insert an event. Returns `true` only for the caller that stored it;
    /// a later insert of the same id leaves the original untouched.
    pub fn put(&self, event: Event) -> bool {
        let mut events = self.events.lock();
        if events.contains_key(&event.id) {
            return false;
        }
        events.insert(event.id.clone(), Arc::new(event));
        true
    }

    pub fn get(&self, id: &str) -> Option<Arc<Event>> {
        self.events.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
