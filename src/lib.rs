//! quotefeed: follow one Nostr author's quote posts across several relays and
//! resolve the full chain of quoted notes behind each of them.

pub mod config;
pub mod engine;
pub mod notify;
pub mod relay;

pub use config::{Config, ConfigError};
pub use engine::{Engine, FeedOrder, FeedView, Settings};
pub use notify::{Notification, Notifier};
pub use relay::{RelayClient, RelayConnector, RelayError, RelayPool, WsConnector};
