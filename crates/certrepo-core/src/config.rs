//! Configuration types for the certificate repository
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::keys::{DEFAULT_BUCKET, KEY_SEPARATOR};
use crate::model::Zone;

/// Repository configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Namespace prefixed to every storage key
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Number of entries fetched per store round trip while listing
    #[serde(default = "default_list_batch_size")]
    pub list_batch_size: usize,

    /// Zone watch settings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl RepositoryConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            bucket: default_bucket(),
            list_batch_size: default_list_batch_size(),
            watch: WatchConfig::default(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_list_batch_size(mut self, size: usize) -> Self {
        self.list_batch_size = size;
        self
    }

    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.bucket.is_empty() {
            return Err(crate::Error::config("Bucket cannot be empty"));
        }
        if self.bucket.contains(KEY_SEPARATOR) {
            return Err(crate::Error::config(format!(
                "Bucket '{}' cannot contain '{}'",
                self.bucket, KEY_SEPARATOR
            )));
        }
        if self.list_batch_size == 0 {
            return Err(crate::Error::config("List batch size must be > 0"));
        }

        self.watch.validate()
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the dispatcher does when a watcher's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the watcher consumes an event
    ///
    /// A stalled watcher stalls every zone mutation until it catches up or
    /// is cancelled.
    #[default]
    Block,

    /// Drop the event for that watcher and count it
    DropEvent,
}

/// Zone watch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Capacity of each watcher's delivery queue
    ///
    /// Default: 1 event, so a dispatch under [`OverflowPolicy::Block`] waits
    /// for the previous event to be picked up.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Behavior when a watcher's queue is full
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl WatchConfig {
    pub fn new(channel_capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            channel_capacity,
            overflow,
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.channel_capacity == 0 {
            return Err(crate::Error::config("Watch channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// File-based store
    File {
        /// Path to the store document
        path: String,
    },
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
        }
    }
}

/// DNS challenge provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Provider name the adapter was registered under (e.g. "netlify")
    pub provider: String,

    /// API token; resolved from the environment when absent
    #[serde(default)]
    pub token: Option<String>,

    /// Provider specific settings
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ChallengeConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            token: None,
            settings: serde_json::Value::Null,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Challenge configuration for the provider serving `zone`
    pub fn for_zone(zone: &Zone) -> Self {
        Self {
            provider: zone.provider.clone(),
            token: zone.token.clone(),
            settings: serde_json::Value::Null,
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.provider.is_empty() {
            return Err(crate::Error::config("Challenge provider cannot be empty"));
        }
        Ok(())
    }
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_list_batch_size() -> usize {
    100
}

fn default_channel_capacity() -> usize {
    1
}
