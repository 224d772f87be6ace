//! Config command - View and manage Notable sync configuration
//!
//! Provides the `notable-sync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use notable_core::config::Config;
use tracing::info;

use super::CliContext;

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("server.url", "WebDAV base URL"),
    ("server.username", "WebDAV username"),
    ("sync.enabled", "true|false"),
    ("sync.auto_sync_enabled", "Sync a notebook when it is closed"),
    ("sync.interval_secs", "Seconds between background cycles"),
    ("sync.device_name", "Name published in the device record"),
    ("sync.listing_cache_ttl_secs", "Seconds a directory listing stays fresh"),
    ("sync.upload_concurrency", "Parallel uploads"),
    ("sync.download_concurrency", "Parallel downloads"),
    ("sync.max_retries", "Attempts before a queued operation gives up"),
    ("sync.queue_batch_size", "Queued operations replayed per batch"),
    ("sync.deletion_retention_days", "Days a synced tombstone is kept"),
    ("network.connect_timeout_secs", "TCP connect timeout"),
    ("network.request_timeout_secs", "Whole-request timeout"),
    ("storage.database", "SQLite database path"),
    ("storage.images_dir", "Image directory"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.file", "Log file path, or 'none' for stdout"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.interval_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.load_config();
        if config.server.password.is_some() {
            config.server.password = Some("********".to_string());
        }

        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;

            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    /// Set a configuration value using dot-notation
    ///
    /// The change is validated before anything is written.
    fn execute_set(&self, ctx: &CliContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.load_config();

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {name:<32} - {help}"));
                }
            }
            anyhow::bail!("Configuration not changed");
        }

        let error_msgs: Vec<String> = config.validate().iter().map(|e| e.to_string()).collect();
        if !error_msgs.is_empty() {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": error_msgs,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{}': {}",
                    key,
                    error_msgs.join("; ")
                ));
            }
            anyhow::bail!("Configuration not changed");
        }

        config
            .save(&ctx.config_path)
            .context("Failed to write configuration file")?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": ctx.config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", ctx.config_path.display()));
        }

        Ok(())
    }

    fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = &ctx.config_path;

        // Load explicitly so parse errors are reported instead of defaulted
        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if !config_path.exists() {
                    if ctx.is_json() {
                        formatter.print_json(&serde_json::json!({
                            "valid": false,
                            "config_path": config_path.display().to_string(),
                            "errors": ["Configuration file not found. Using defaults."],
                        }));
                    } else {
                        formatter.info(&format!(
                            "Configuration file not found at {}",
                            config_path.display()
                        ));
                        formatter.info("Using default configuration. Run 'notable-sync config set <key> <value>' to create one.");
                    }
                    return Ok(());
                }

                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                anyhow::bail!("Invalid configuration");
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");

        let errors = config.validate();

        if ctx.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration")
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => anyhow::bail!("Expected true or false, got '{}'", other),
    }
}

/// Apply a dot-notation key/value pair to a Config struct
///
/// See [`SUPPORTED_KEYS`] for the accepted keys. `server.password` is not
/// accepted; passwords go through `auth login`.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- server ---
        "server.url" => {
            config.server.url = value.trim().to_string();
        }
        "server.username" => {
            config.server.username = value.trim().to_string();
        }

        // --- sync ---
        "sync.enabled" => {
            config.sync.enabled = parse_bool(value)?;
        }
        "sync.auto_sync_enabled" => {
            config.sync.auto_sync_enabled = parse_bool(value)?;
        }
        "sync.interval_secs" => {
            config.sync.interval_secs = value
                .parse::<u64>()
                .context("Expected a positive integer for sync.interval_secs")?;
        }
        "sync.device_name" => {
            config.sync.device_name = value.to_string();
        }
        "sync.listing_cache_ttl_secs" => {
            config.sync.listing_cache_ttl_secs = value
                .parse::<u64>()
                .context("Expected a positive integer")?;
        }
        "sync.upload_concurrency" => {
            config.sync.upload_concurrency = value
                .parse::<usize>()
                .context("Expected a positive integer")?;
        }
        "sync.download_concurrency" => {
            config.sync.download_concurrency = value
                .parse::<usize>()
                .context("Expected a positive integer")?;
        }
        "sync.max_retries" => {
            config.sync.max_retries = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "sync.queue_batch_size" => {
            config.sync.queue_batch_size = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "sync.deletion_retention_days" => {
            config.sync.deletion_retention_days = value
                .parse::<u32>()
                .context("Expected a non-negative integer")?;
        }

        // --- network ---
        "network.connect_timeout_secs" => {
            config.network.connect_timeout_secs = value
                .parse::<u64>()
                .context("Expected a positive integer")?;
        }
        "network.request_timeout_secs" => {
            config.network.request_timeout_secs = value
                .parse::<u64>()
                .context("Expected a positive integer")?;
        }

        // --- storage ---
        "storage.database" => {
            config.storage.database = PathBuf::from(value);
        }
        "storage.images_dir" => {
            config.storage.images_dir = PathBuf::from(value);
        }

        // --- logging ---
        "logging.level" => {
            config.logging.level = value.to_string();
        }
        "logging.file" => {
            config.logging.file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    #[test]
    fn test_apply_server_fields_are_trimmed() {
        let mut config = Config::default();
        apply_config_value(&mut config, "server.url", " https://dav.example.com/notes ").unwrap();
        apply_config_value(&mut config, "server.username", "alice ").unwrap();
        assert_eq!(config.server.url, "https://dav.example.com/notes");
        assert_eq!(config.server.username, "alice");
    }

    #[test]
    fn test_apply_sync_enabled() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.enabled", "yes").unwrap();
        assert!(config.sync.enabled);
        apply_config_value(&mut config, "sync.enabled", "OFF").unwrap();
        assert!(!config.sync.enabled);
    }

    #[test]
    fn test_apply_invalid_bool_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.auto_sync_enabled", "maybe").is_err());
    }

    #[test]
    fn test_apply_sync_interval() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.interval_secs", "60").unwrap();
        assert_eq!(config.sync.interval_secs, 60);
    }

    #[test]
    fn test_apply_concurrency() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.upload_concurrency", "8").unwrap();
        apply_config_value(&mut config, "sync.download_concurrency", "16").unwrap();
        assert_eq!(config.sync.upload_concurrency, 8);
        assert_eq!(config.sync.download_concurrency, 16);
    }

    #[test]
    fn test_apply_queue_settings() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.max_retries", "3").unwrap();
        apply_config_value(&mut config, "sync.queue_batch_size", "25").unwrap();
        apply_config_value(&mut config, "sync.deletion_retention_days", "7").unwrap();
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.queue_batch_size, 25);
        assert_eq!(config.sync.deletion_retention_days, 7);
    }

    #[test]
    fn test_apply_network_timeouts() {
        let mut config = Config::default();
        apply_config_value(&mut config, "network.connect_timeout_secs", "5").unwrap();
        apply_config_value(&mut config, "network.request_timeout_secs", "120").unwrap();
        assert_eq!(config.network.connect_timeout_secs, 5);
        assert_eq!(config.network.request_timeout_secs, 120);
    }

    #[test]
    fn test_apply_storage_paths() {
        let mut config = Config::default();
        apply_config_value(&mut config, "storage.database", "/data/notable.db").unwrap();
        apply_config_value(&mut config, "storage.images_dir", "/data/images").unwrap();
        assert_eq!(config.storage.database, PathBuf::from("/data/notable.db"));
        assert_eq!(config.storage.images_dir, PathBuf::from("/data/images"));
    }

    #[test]
    fn test_apply_logging_file() {
        let mut config = Config::default();
        apply_config_value(&mut config, "logging.file", "/var/log/notable-sync.log").unwrap();
        assert_eq!(
            config.logging.file,
            Some(PathBuf::from("/var/log/notable-sync.log"))
        );
        apply_config_value(&mut config, "logging.file", "none").unwrap();
        assert_eq!(config.logging.file, None);
    }

    #[test]
    fn test_apply_password_is_not_settable() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "server.password", "hunter2").is_err());
        assert!(config.server.password.is_none());
    }

    #[test]
    fn test_apply_unknown_key_fails() {
        let mut config = Config::default();
        let result = apply_config_value(&mut config, "unknown.key", "value");
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_negative_number_fails() {
        let mut config = Config::default();
        let result = apply_config_value(&mut config, "sync.interval_secs", "-5");
        assert!(result.is_err());
    }

    #[test]
    fn test_supported_keys_are_all_applicable() {
        for (key, _) in SUPPORTED_KEYS {
            let mut config = Config::default();
            let value = match *key {
                "sync.enabled" | "sync.auto_sync_enabled" => "true",
                k if k.starts_with("sync.") && k != "sync.device_name" => "3",
                k if k.starts_with("network.") => "3",
                _ => "value",
            };
            assert!(
                apply_config_value(&mut config, key, value).is_ok(),
                "{key} should be settable"
            );
        }
    }

    #[tokio::test]
    async fn test_set_writes_file_and_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let ctx = CliContext::new(OutputFormat::Json, Some(path.clone()), true);

        ConfigCommand::Set {
            key: "sync.interval_secs".into(),
            value: "120".into(),
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert_eq!(Config::load(&path).unwrap().sync.interval_secs, 120);

        let rejected = ConfigCommand::Set {
            key: "sync.queue_batch_size".into(),
            value: "0".into(),
        }
        .execute(&ctx)
        .await;
        assert!(rejected.is_err());
        assert_eq!(Config::load(&path).unwrap().sync.queue_batch_size, 10);
    }
}
