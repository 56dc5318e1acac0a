//! Configuration file parser for `feedrelay.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which has no categories and therefore does nothing. Unknown keys are
//! accepted by serde but logged as warnings to surface typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the global webhook URL.
pub const WEBHOOK_ENV: &str = "DISCORD_WEBHOOK_URL";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Parsed fine but describes something the pipeline cannot run.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// A named partition of articles with its own feeds and retention state.
///
/// `webhook_url` overrides the global destination for this category. It is
/// redacted from `Debug` output.
#[derive(Clone, Deserialize)]
pub struct Category {
    /// Stable key, also the storage file stem.
    pub id: String,
    /// Display label used in notifications and the index.
    pub name: String,
    #[serde(default)]
    pub feeds: Vec<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Category")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("feeds", &self.feeds)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `<category>.json` and `index.json`.
    pub data_dir: PathBuf,

    /// Posted-history document.
    pub history_file: PathBuf,

    /// Articles older than this many days are dropped on the next merge.
    pub retention_days: u32,

    /// Minimum gap between two outbound notifications, in milliseconds.
    pub notify_interval_ms: u64,

    /// Per-request deadline for feed fetches.
    pub fetch_timeout_secs: u64,

    /// Per-call deadline for notifications.
    pub notify_timeout_secs: u64,

    /// Categories collected and merged at the same time.
    pub fetch_concurrency: usize,

    /// Default Discord webhook. `DISCORD_WEBHOOK_URL` takes precedence.
    pub webhook_url: Option<String>,

    pub categories: Vec<Category>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("docs/data"),
            history_file: PathBuf::from("data/post-history.json"),
            retention_days: 90,
            notify_interval_ms: 1000,
            fetch_timeout_secs: 30,
            notify_timeout_secs: 15,
            fetch_concurrency: 4,
            webhook_url: None,
            categories: Vec::new(),
        }
    }
}

/// Mask webhook URLs in Debug output; they embed the webhook token.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("history_file", &self.history_file)
            .field("retention_days", &self.retention_days)
            .field("notify_interval_ms", &self.notify_interval_ms)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("notify_timeout_secs", &self.notify_timeout_secs)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "[REDACTED]"))
            .field("categories", &self.categories)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "data_dir",
        "history_file",
        "retention_days",
        "notify_interval_ms",
        "fetch_timeout_secs",
        "notify_timeout_secs",
        "fetch_concurrency",
        "webhook_url",
        "categories",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// Does not validate; call [`Config::validate`] before running.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            categories = config.categories.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply environment overrides (`DISCORD_WEBHOOK_URL`).
    pub fn apply_env_overrides(&mut self) {
        self.apply_webhook_override(std::env::var(WEBHOOK_ENV).ok());
    }

    fn apply_webhook_override(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using webhook URL from environment");
            self.webhook_url = Some(url);
        }
    }

    /// Check invariants the pipeline relies on.
    ///
    /// Category ids become file names, so they are restricted to ASCII
    /// alphanumerics, `-` and `_`, and must be unique. Feed and webhook URLs
    /// must be http(s).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days == 0 {
            return Err(ConfigError::Invalid(
                "retention_days must be at least 1".to_string(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.notify_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "notify_timeout_secs must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if !is_safe_id(&category.id) {
                return Err(ConfigError::Invalid(format!(
                    "category id {:?} must be non-empty ASCII letters, digits, '-' or '_'",
                    category.id
                )));
            }
            if category.id == "index" {
                return Err(ConfigError::Invalid(
                    "category id \"index\" collides with index.json".to_string(),
                ));
            }
            if !seen.insert(category.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate category id {:?}",
                    category.id
                )));
            }
            for feed in &category.feeds {
                check_http_url(feed).map_err(|reason| {
                    ConfigError::Invalid(format!(
                        "category {:?}: feed {:?} {}",
                        category.id, feed, reason
                    ))
                })?;
            }
            if let Some(url) = &category.webhook_url {
                check_http_url(url).map_err(|reason| {
                    ConfigError::Invalid(format!(
                        "category {:?}: webhook_url {}",
                        category.id, reason
                    ))
                })?;
            }
        }

        if let Some(url) = &self.webhook_url {
            check_http_url(url)
                .map_err(|reason| ConfigError::Invalid(format!("webhook_url {}", reason)))?;
        }

        Ok(())
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    /// Destination for a category: its own webhook, else the global one.
    pub fn destination_for(&self, category: &Category) -> Option<SecretString> {
        category
            .webhook_url
            .as_ref()
            .or(self.webhook_url.as_ref())
            .map(|url| SecretString::from(url.clone()))
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("is not a valid URL: {}", e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(format!("uses unsupported scheme {:?}", scheme)),
    }
}

// ============================================================================
// Tests
// ============================================================================
