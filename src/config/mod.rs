//! Configuration management
//!
//! This module handles loading and parsing configuration for the Spiral client.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backing store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Change notification configuration
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Feed configuration
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path or URL (`:memory:` for an in-process store)
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/spiral.db".to_string()
}

fn default_max_connections() -> u32 {
    8
}

/// Realtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Number of change events buffered per subscriber before it lags
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for stored objects
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Base URL public object URLs are resolved against
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Maximum object size in bytes (default: 5MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            public_url: default_public_url(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/storage")
}

fn default_public_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl StorageConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Days until a session token expires
    #[serde(default = "default_expiration_days")]
    pub expiration_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_days: default_expiration_days(),
        }
    }
}

fn default_expiration_days() -> i64 {
    7
}

/// Feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Posts fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    20
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - SPIRAL_DATABASE_URL
    /// - SPIRAL_STORAGE_PATH
    /// - SPIRAL_STORAGE_PUBLIC_URL
    /// - SPIRAL_STORAGE_MAX_FILE_SIZE
    /// - SPIRAL_REALTIME_CHANNEL_CAPACITY
    /// - SPIRAL_SESSION_EXPIRATION_DAYS
    /// - SPIRAL_FEED_PAGE_SIZE
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SPIRAL_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(path) = std::env::var("SPIRAL_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Ok(public_url) = std::env::var("SPIRAL_STORAGE_PUBLIC_URL") {
            self.storage.public_url = public_url;
        }
        if let Ok(size) = std::env::var("SPIRAL_STORAGE_MAX_FILE_SIZE") {
            if let Ok(size) = size.parse::<u64>() {
                self.storage.max_file_size = size;
            }
        }

        if let Ok(capacity) = std::env::var("SPIRAL_REALTIME_CHANNEL_CAPACITY") {
            // broadcast channels panic on zero capacity
            if let Ok(capacity) = capacity.parse::<usize>() {
                if capacity > 0 {
                    self.realtime.channel_capacity = capacity;
                }
            }
        }

        if let Ok(days) = std::env::var("SPIRAL_SESSION_EXPIRATION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.session.expiration_days = days;
            }
        }

        if let Ok(size) = std::env::var("SPIRAL_FEED_PAGE_SIZE") {
            if let Ok(size) = size.parse::<usize>() {
                if size > 0 {
                    self.feed.page_size = size;
                }
            }
        }
    }

    /// In-memory configuration used by tests and the demo binary
    pub fn in_memory(storage_path: PathBuf) -> Self {
        Self {
            database: DatabaseConfig {
                url: ":memory:".to_string(),
                max_connections: 1,
            },
            storage: StorageConfig {
                path: storage_path,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
