//! Feed ordering and child slots.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOrder {
    /// Arrival order; the oldest displayed entry is evicted past the cap.
    #[default]
    Append,
    /// Newest repost time first, re-sorted on every insert.
    RepostTime,
}

/// A top-level (tracked author) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TopLevelEntry {
    id: String,
    created_at: u64,
    /// Event this entry mentions through its tag.
    quoted: Option<String>,
}

#[derive(Debug, Default)]
struct FeedState {
    displayed: VecDeque<TopLevelEntry>,
    children: HashMap<String, Vec<String>>,
    repost_times: HashMap<String, u64>,
}

impl FeedState {
    fn sort_key(&self, entry: &TopLevelEntry) -> u64 {
        entry
            .quoted
            .as_ref()
            .and_then(|q| self.repost_times.get(q))
            .copied()
            .unwrap_or(entry.created_at)
    }
}

#[derive(Debug)]
pub struct Feed {
    order: FeedOrder,
    max_displayed: usize,
    state: Mutex<FeedState>,
}

impl Feed {
    pub fn new(order: FeedOrder, max_displayed: usize) -> Self {
        Self {
            order,
            max_displayed,
            state: Mutex::new(FeedState::default()),
        }
    }

    /// Position a newly stored top-level event.
    pub fn add_top_level(&self, id: &str, created_at: u64, quoted: Option<&str>) {
        let mut state = self.state.lock();
        let entry = TopLevelEntry {
            id: id.to_string(),
            created_at,
            quoted: quoted.map(str::to_string),
        };

        match self.order {
            FeedOrder::Append => {
                state.displayed.push_back(entry);
                if state.displayed.len() > self.max_displayed {
                    if let Some(evicted) = state.displayed.pop_front() {
                        debug!("Evicted {} from displayed feed", evicted.id);
                    }
                }
            }
            FeedOrder::RepostTime => {
                if let Some(quoted) = quoted {
                    let time = state.repost_times.entry(quoted.to_string()).or_insert(0);
                    *time = (*time).max(created_at);
                }
                state.displayed.push_back(entry);

                let mut displayed = std::mem::take(&mut state.displayed);
                displayed
                    .make_contiguous()
                    .sort_by_key(|e| std::cmp::Reverse(state.sort_key(e)));
                displayed.truncate(self.max_displayed);
                state.displayed = displayed;
            }
        }
    }

    /// Attach `child` to `parent`'s slot. Returns false if already there.
    pub fn attach_child(&self, parent: &str, child: &str) -> bool {
        let mut state = self.state.lock();
        let slot = state.children.entry(parent.to_string()).or_default();
        if slot.iter().any(|c| c == child) {
            return false;
        }
        slot.push(child.to_string());
        true
    }

    pub fn top_level_ids(&self) -> Vec<String> {
        self.state.lock().displayed.iter().map(|e| e.id.clone()).collect()
    }

    pub fn children(&self, parent: &str) -> Vec<String> {
        self.state
            .lock()
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn repost_time(&self, quoted: &str) -> Option<u64> {
        self.state.lock().repost_times.get(quoted).copied()
    }
}
