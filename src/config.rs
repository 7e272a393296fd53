//! Configuration file parser for the aggregator (`config.toml`).
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use crate::aggregate::ChannelInfo;
use crate::feed::{default_user_agent, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but cannot be used (empty marker, bad URL, zero limits).
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Title of every combined feed.
    pub feed_title: String,

    pub feed_description: String,

    /// Canonical URL of the site publishing the combined feeds.
    pub feed_url: String,

    pub feed_image_url: String,

    /// Items mentioning this keyword (title, category, or keywords) are kept.
    pub marker_keyword: String,

    pub request_timeout_secs: u64,

    /// Retries after the first attempt of each feed request.
    pub max_retries: u32,

    /// Backoff unit in milliseconds; retry `r` waits `r * 1.2^r` units.
    pub retry_base_delay_ms: u64,

    /// Authors read concurrently during one aggregation.
    pub max_concurrent_fetches: usize,

    /// Cap on items per combined feed. Unset keeps every item.
    pub max_items: Option<usize>,

    /// Refresh interval in minutes. 0 = run once and exit.
    pub refresh_interval_minutes: u64,

    /// User-Agent for feed requests. Defaults to `planet/<version>`.
    pub user_agent: Option<String>,

    /// JSON author roster.
    pub authors_path: PathBuf,

    /// Directory that receives `feed.<language>.rss` files.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_title: "Planet Rust".to_string(),
            feed_description: "Posts from the Rust community".to_string(),
            feed_url: "https://planet.example.com/".to_string(),
            feed_image_url: "https://planet.example.com/logo.png".to_string(),
            marker_keyword: "rust".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: 1000,
            max_concurrent_fetches: 16,
            max_items: None,
            refresh_interval_minutes: 0,
            user_agent: None,
            authors_path: PathBuf::from("authors.json"),
            output_dir: PathBuf::from("feeds"),
        }
    }
}

/// Environment variables overriding the feed envelope, in field order.
const ENV_OVERRIDES: [&str; 4] = [
    "PLANET_FEED_TITLE",
    "PLANET_FEED_DESCRIPTION",
    "PLANET_FEED_URL",
    "PLANET_FEED_IMAGE_URL",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "feed_title",
                "feed_description",
                "feed_url",
                "feed_image_url",
                "marker_keyword",
                "request_timeout_secs",
                "max_retries",
                "retry_base_delay_ms",
                "max_concurrent_fetches",
                "max_items",
                "refresh_interval_minutes",
                "user_agent",
                "authors_path",
                "output_dir",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), title = %config.feed_title, "Loaded configuration");
        Ok(config)
    }

    /// Applies `PLANET_FEED_*` overrides; `lookup` is usually `std::env::var(..).ok()`.
    ///
    /// Environment values take precedence over the config file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let [title, description, url, image_url] = ENV_OVERRIDES;
        let targets = [
            (title, &mut self.feed_title),
            (description, &mut self.feed_description),
            (url, &mut self.feed_url),
            (image_url, &mut self.feed_image_url),
        ];
        for (var, field) in targets {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(var = %var, "Config value overridden from environment");
                *field = value;
            }
        }
    }

    /// Rejects values the aggregator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.marker_keyword.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "marker_keyword must not be empty".to_string(),
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.channel_info().map(|_| ())
    }

    /// Static envelope for combined feeds.
    pub fn channel_info(&self) -> Result<ChannelInfo, ConfigError> {
        Ok(ChannelInfo {
            title: self.feed_title.clone(),
            description: self.feed_description.clone(),
            url: parse_url("feed_url", &self.feed_url)?,
            image_url: parse_url("feed_image_url", &self.feed_image_url)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(default_user_agent)
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{key} '{value}': {e}")))
}

// ============================================================================
// Tests
// ============================================================================
