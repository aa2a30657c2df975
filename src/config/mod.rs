//! `quotefeed.toml` loading and validation.

use anyhow::{Context, Result};
use nostr_core::{
    looks_like_relay_url, IdentifierCodec, MentionMode, KIND_METADATA, KIND_TEXT_NOTE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::engine::{
    FeedOrder, Settings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_DISPLAYED, DEFAULT_PREVIEW_LENGTH,
    DEFAULT_SUBSCRIPTION_LIMIT,
};

pub const DEFAULT_CONFIG_PATH: &str = "quotefeed.toml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no relays configured")]
    NoRelays,
    #[error("relay URL must start with ws:// or wss://: {0}")]
    InvalidRelay(String),
    #[error("tracked author is not set (use [tracking] author or --author)")]
    MissingAuthor,
    #[error("tracked author is invalid: {0}")]
    InvalidAuthor(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub relays: RelaysConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelaysConfig {
    #[serde(default = "default_relay_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_subscription_limit")]
    pub subscription_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TrackingConfig {
    /// npub or hex key of the author whose quotes are followed.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default = "default_note_kind")]
    pub note_kind: u16,
    #[serde(default = "default_metadata_kind")]
    pub metadata_kind: u16,
    #[serde(default)]
    pub mention_mode: MentionMode,
    /// Unbounded when absent.
    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedConfig {
    #[serde(default)]
    pub order: FeedOrder,
    #[serde(default = "default_max_displayed")]
    pub max_displayed: usize,
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RelaysConfig {
    fn default() -> Self {
        Self {
            urls: default_relay_urls(),
            connect_timeout_secs: default_connect_timeout_secs(),
            subscription_limit: default_subscription_limit(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            author: None,
            note_kind: default_note_kind(),
            metadata_kind: default_metadata_kind(),
            mention_mode: MentionMode::default(),
            max_depth: None,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            order: FeedOrder::default(),
            max_displayed: default_max_displayed(),
            preview_length: default_preview_length(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_relay_urls() -> Vec<String> {
    vec![
        "wss://relay.damus.io".to_string(),
        "wss://nos.lol".to_string(),
        "wss://relay.primal.net".to_string(),
    ]
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_subscription_limit() -> usize {
    DEFAULT_SUBSCRIPTION_LIMIT
}

fn default_note_kind() -> u16 {
    KIND_TEXT_NOTE
}

fn default_metadata_kind() -> u16 {
    KIND_METADATA
}

fn default_max_displayed() -> usize {
    DEFAULT_MAX_DISPLAYED
}

fn default_preview_length() -> usize {
    DEFAULT_PREVIEW_LENGTH
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(path);
        let content = fs::read_to_string(expanded_path.as_ref())
            .with_context(|| format!("Failed to read config file: {path}"))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse TOML config: {path}"))
    }

    /// Apply command-line overrides. Any `--relay` replaces the configured list.
    pub fn apply_overrides(&mut self, relays: &[String], author: Option<&str>) {
        if !relays.is_empty() {
            self.relays.urls = relays.to_vec();
        }
        if let Some(author) = author {
            self.tracking.author = Some(author.to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relays.urls.is_empty() {
            return Err(ConfigError::NoRelays);
        }
        if let Some(bad) = self.relays.urls.iter().find(|u| !looks_like_relay_url(u)) {
            return Err(ConfigError::InvalidRelay(bad.clone()));
        }
        if self.relays.connect_timeout_secs == 0 {
            return Err(ConfigError::Zero("relays.connect_timeout_secs"));
        }
        if self.relays.subscription_limit == 0 {
            return Err(ConfigError::Zero("relays.subscription_limit"));
        }
        if self.feed.max_displayed == 0 {
            return Err(ConfigError::Zero("feed.max_displayed"));
        }
        if self.feed.preview_length == 0 {
            return Err(ConfigError::Zero("feed.preview_length"));
        }
        match self.tracking.author.as_deref() {
            Some(author) if !author.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::MissingAuthor),
        }
    }

    /// Validate and decode into engine settings.
    pub fn into_settings(self, codec: &dyn IdentifierCodec) -> Result<Settings, ConfigError> {
        self.validate()?;
        let author = self.tracking.author.as_deref().unwrap_or_default();
        let tracked_author = codec
            .decode_identity(author)
            .map_err(|e| ConfigError::InvalidAuthor(e.to_string()))?;

        Ok(Settings {
            relays: self.relays.urls,
            tracked_author,
            note_kind: self.tracking.note_kind,
            metadata_kind: self.tracking.metadata_kind,
            connect_timeout: Duration::from_secs(self.relays.connect_timeout_secs),
            max_displayed: self.feed.max_displayed,
            content_preview_length: self.feed.preview_length,
            feed_order: self.feed.order,
            mention_mode: self.tracking.mention_mode,
            max_depth: self.tracking.max_depth,
            subscription_limit: self.relays.subscription_limit,
        })
    }
}
