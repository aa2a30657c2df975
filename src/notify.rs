//! Push notifications from the engine to whatever renders the feed.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Default buffer for the notification broadcast channel.
const NOTIFICATION_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The top-level ordering or some child slot changed.
    FeedChanged,
    /// A profile for this author key was stored or replaced.
    ProfileResolved(String),
    /// Human-readable connection status.
    StatusChanged(String),
    /// Connected relay count and stored note count.
    Counts { relays: usize, notes: usize },
}

/// Fan-out sender that also remembers the last published counts.
#[derive(Debug)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    relays: AtomicUsize,
    notes: AtomicUsize,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            tx,
            relays: AtomicUsize::new(0),
            notes: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish a notification. Having no listeners is not an error.
    pub fn send(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(Notification::StatusChanged(text.into()));
    }

    pub fn set_relay_count(&self, relays: usize) {
        self.relays.store(relays, Ordering::SeqCst);
        self.publish_counts();
    }

    pub fn set_note_count(&self, notes: usize) {
        self.notes.store(notes, Ordering::SeqCst);
        self.publish_counts();
    }

    pub fn relay_count(&self) -> usize {
        self.relays.load(Ordering::SeqCst)
    }

    pub fn note_count(&self) -> usize {
        self.notes.load(Ordering::SeqCst)
    }

    fn publish_counts(&self) {
        self.send(Notification::Counts {
            relays: self.relay_count(),
            notes: self.note_count(),
        });
    }
}
