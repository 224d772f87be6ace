//! Configuration module for Notable sync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application directory name under the platform config and data dirs.
pub const APP_DIR: &str = "notable-sync";

/// Environment variable consulted for the server password.
pub const PASSWORD_ENV: &str = "NOTABLE_SYNC_PASSWORD";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Notable sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// WebDAV server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the WebDAV account. Empty until configured.
    pub url: String,
    pub username: String,
    /// Plain-text password. When `None` the keyring or
    /// `NOTABLE_SYNC_PASSWORD` is consulted instead.
    pub password: Option<String>,
}

impl ServerConfig {
    /// Whether enough is set to attempt a connection.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.username.trim().is_empty()
    }
}

/// Synchronization behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Master switch; nothing syncs while false.
    pub enabled: bool,
    /// Sync a notebook when it is closed.
    pub auto_sync_enabled: bool,
    /// Seconds between background bidirectional cycles.
    pub interval_secs: u64,
    /// Human-readable name published in the device record.
    pub device_name: String,
    /// Seconds a remote directory listing stays fresh.
    pub listing_cache_ttl_secs: u64,
    pub upload_concurrency: usize,
    pub download_concurrency: usize,
    /// Attempts before a queue entry goes dormant.
    pub max_retries: u32,
    /// Ready queue entries processed per drain.
    pub queue_batch_size: u32,
    /// Days a synced tombstone is kept.
    pub deletion_retention_days: u32,
}

/// HTTP timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding notes, queue and tombstones.
    pub database: PathBuf,
    /// Directory where image bytes are stored.
    pub images_dir: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Optional log file; stdout when unset.
    pub file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/notable-sync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join(APP_DIR)
            .join("config.yaml")
    }

    /// Password from the file or the environment, in that order.
    pub fn inline_password(&self) -> Option<String> {
        self.server
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty()))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join(APP_DIR)
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_sync_enabled: true,
            interval_secs: 300,
            device_name: std::env::var("HOSTNAME")
                .ok()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| "notable-device".to_string()),
            listing_cache_ttl_secs: 300,
            upload_concurrency: 4,
            download_concurrency: 4,
            max_retries: 5,
            queue_batch_size: 10,
            deletion_retention_days: 30,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            request_timeout_secs: 300,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            database: data_dir.join("notable.db"),
            images_dir: data_dir.join("images"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. An empty server URL
    /// is allowed (sync reports "not configured"), a malformed one is not.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- server ---
        if !self.server.url.trim().is_empty() {
            match url::Url::parse(&self.server.url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => errors.push(ValidationError {
                    field: "server.url".into(),
                    message: format!("unsupported scheme '{}'", parsed.scheme()),
                }),
                Err(e) => errors.push(ValidationError {
                    field: "server.url".into(),
                    message: format!("invalid URL: {e}"),
                }),
            }
            if self.server.username.trim().is_empty() {
                errors.push(ValidationError {
                    field: "server.username".into(),
                    message: "required when server.url is set".into(),
                });
            }
        }

        // --- sync ---
        positive(&mut errors, "sync.interval_secs", self.sync.interval_secs);
        positive(
            &mut errors,
            "sync.listing_cache_ttl_secs",
            self.sync.listing_cache_ttl_secs,
        );
        positive(
            &mut errors,
            "sync.upload_concurrency",
            self.sync.upload_concurrency as u64,
        );
        positive(
            &mut errors,
            "sync.download_concurrency",
            self.sync.download_concurrency as u64,
        );
        positive(&mut errors, "sync.max_retries", self.sync.max_retries.into());
        positive(
            &mut errors,
            "sync.queue_batch_size",
            self.sync.queue_batch_size.into(),
        );
        if self.sync.device_name.trim().is_empty() {
            errors.push(ValidationError {
                field: "sync.device_name".into(),
                message: "must not be empty".into(),
            });
        }

        // --- network ---
        positive(
            &mut errors,
            "network.connect_timeout_secs",
            self.network.connect_timeout_secs,
        );
        positive(
            &mut errors,
            "network.request_timeout_secs",
            self.network.request_timeout_secs,
        );

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use notable_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .server("https://dav.example.com/remote.php/webdav", "alice")
///     .sync_enabled(true)
///     .sync_interval_secs(120)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- server ---

    pub fn server(mut self, url: impl Into<String>, username: impl Into<String>) -> Self {
        self.config.server.url = url.into();
        self.config.server.username = username.into();
        self
    }

    pub fn server_password(mut self, password: impl Into<String>) -> Self {
        self.config.server.password = Some(password.into());
        self
    }

    // --- sync ---

    pub fn sync_enabled(mut self, enabled: bool) -> Self {
        self.config.sync.enabled = enabled;
        self
    }

    pub fn sync_auto_sync_enabled(mut self, enabled: bool) -> Self {
        self.config.sync.auto_sync_enabled = enabled;
        self
    }

    pub fn sync_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.interval_secs = seconds;
        self
    }

    pub fn sync_device_name(mut self, name: impl Into<String>) -> Self {
        self.config.sync.device_name = name.into();
        self
    }

    pub fn sync_listing_cache_ttl_secs(mut self, seconds: u64) -> Self {
        self.config.sync.listing_cache_ttl_secs = seconds;
        self
    }

    pub fn sync_upload_concurrency(mut self, n: usize) -> Self {
        self.config.sync.upload_concurrency = n;
        self
    }

    pub fn sync_download_concurrency(mut self, n: usize) -> Self {
        self.config.sync.download_concurrency = n;
        self
    }

    pub fn sync_max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn sync_queue_batch_size(mut self, n: u32) -> Self {
        self.config.sync.queue_batch_size = n;
        self
    }

    // --- network ---

    pub fn network_connect_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.network.connect_timeout_secs = seconds;
        self
    }

    pub fn network_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.network.request_timeout_secs = seconds;
        self
    }

    // --- storage ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    pub fn storage_images_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.images_dir = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
