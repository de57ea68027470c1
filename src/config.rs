//! Configuration management for filewatch
//!
//! This module provides configuration structures and defaults for the
//! watcher, the event store, the live display and the delivery queue.

use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory watcher configuration
    pub watcher: WatcherConfig,
    /// Event store configuration
    pub store: StoreConfig,
    /// Live display configuration
    pub display: DisplayConfig,
    /// Delivery queue configuration
    pub queue: QueueConfig,
}

/// Configuration for directory watching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Include subdirectories
    pub recursive: bool,
    /// Single extension to admit; `None` admits everything
    pub extension_filter: Option<String>,
    /// How often the consumer drains the queue, in milliseconds
    pub poll_interval_ms: u64,
    /// Window for dropping repeated notifications on the same path (0 disables)
    pub event_debounce_ms: u64,
}

/// Configuration for the SQLite event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file, or `:memory:`
    pub db_path: PathBuf,
    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
    /// Maximum pooled connections
    pub pool_max_size: u32,
    /// How long an operation waits for a connection before giving up
    pub connect_timeout_ms: u64,
}

/// Configuration for the live display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Most recent entries kept on screen
    pub retention_cap: usize,
}

/// Configuration for the delivery queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bound on queued events; `None` is unbounded, overflow drops the oldest
    pub capacity: Option<usize>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            extension_filter: None,
            poll_interval_ms: 100,
            event_debounce_ms: 0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("filewatch.db"),
            busy_timeout_ms: 5_000,
            pool_max_size: 4,
            connect_timeout_ms: 2_000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { retention_cap: 100 }
    }
}

impl WatcherConfig {
    /// Get consumer poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.event_debounce_ms)
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        // r2d2 rejects a zero timeout.
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}

/// Configuration loading and management
impl AppConfig {
    /// Load configuration from a TOML file, or defaults when it does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            tracing::debug!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment variable overrides
    pub fn with_env(mut self) -> Self {
        if let Ok(val) = std::env::var("FILEWATCH_DB_PATH") {
            if !val.trim().is_empty() {
                self.store.db_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("FILEWATCH_RETENTION_CAP") {
            if let Ok(cap) = val.parse::<usize>() {
                self.display.retention_cap = cap;
            }
        }

        if let Ok(val) = std::env::var("FILEWATCH_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watcher.poll_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("FILEWATCH_QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse::<usize>() {
                self.queue.capacity = Some(capacity);
            }
        }

        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.display.retention_cap == 0 {
            return Err("retention_cap must be greater than 0".to_string());
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }

        if self.store.pool_max_size == 0 {
            return Err("pool_max_size must be greater than 0".to_string());
        }

        if self.queue.capacity == Some(0) {
            return Err("queue capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}
