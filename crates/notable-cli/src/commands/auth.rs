//! Auth commands - Login, Logout, and Status for the WebDAV server
//!
//! Provides the `notable-sync auth` CLI subcommands which:
//! 1. `login`  - Verifies the credentials against the server, stores the
//!    password in the system keyring, and saves URL and username to the config.
//! 2. `logout` - Clears the password from the keyring.
//! 3. `status` - Shows where the password comes from and whether the server answers.

use anyhow::{Context, Result};
use clap::Subcommand;
use notable_core::{
    config::{Config, PASSWORD_ENV},
    ports::IRemoteStore,
};
use notable_webdav::{KeyringCredentialStorage, WebDavClient, WebDavRemoteStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::CliContext;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Store credentials for a WebDAV server
    Login {
        /// Base URL of the WebDAV account
        #[arg(long)]
        url: String,
        /// Account username
        #[arg(long)]
        username: String,
        /// Password; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
        /// Save without contacting the server
        #[arg(long)]
        no_verify: bool,
    },
    /// Remove stored credentials
    Logout {
        /// Also clear the server URL and username from the config
        #[arg(long)]
        forget_server: bool,
    },
    /// Check credential and connection status
    Status,
}

/// Where the password for the configured server would come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PasswordSource {
    ConfigFile,
    Environment,
    Keyring,
    Missing,
}

impl PasswordSource {
    fn as_str(&self) -> &'static str {
        match self {
            PasswordSource::ConfigFile => "config file",
            PasswordSource::Environment => "environment",
            PasswordSource::Keyring => "keyring",
            PasswordSource::Missing => "missing",
        }
    }
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            AuthCommand::Login {
                url,
                username,
                password,
                no_verify,
            } => {
                self.execute_login(ctx, url, username, password.clone(), *no_verify)
                    .await
            }
            AuthCommand::Logout { forget_server } => self.execute_logout(ctx, *forget_server),
            AuthCommand::Status => self.execute_status(ctx).await,
        }
    }

    /// Execute the login flow:
    /// 1. Apply URL and username to the loaded config and validate it
    /// 2. Read the password
    /// 3. Probe the server unless `--no-verify`
    /// 4. Store the password in the keyring and save the config
    async fn execute_login(
        &self,
        ctx: &CliContext,
        url: &str,
        username: &str,
        password: Option<String>,
        no_verify: bool,
    ) -> Result<()> {
        let fmt = ctx.formatter();
        let mut config = ctx.load_config();
        config.server.url = url.trim().to_string();
        config.server.username = username.trim().to_string();
        config.server.password = None;

        let problems: Vec<String> = config
            .validate()
            .iter()
            .filter(|e| e.field.starts_with("server."))
            .map(|e| e.to_string())
            .collect();
        if !problems.is_empty() {
            anyhow::bail!("Invalid server settings: {}", problems.join("; "));
        }

        let password = match password {
            Some(p) => p,
            None => {
                fmt.info("Password:");
                read_password(BufReader::new(tokio::io::stdin())).await?
            }
        };

        if !no_verify {
            info!(url = %config.server.url, "Verifying WebDAV credentials");
            let client = WebDavClient::new(
                config.server.url.clone(),
                config.server.username.clone(),
                password.clone(),
                &config.network,
            )?;
            let store = WebDavRemoteStore::new(
                client,
                chrono::Duration::seconds(config.sync.listing_cache_ttl_secs as i64),
            );
            if !store.test_connection().await.unwrap_or(false) {
                anyhow::bail!(
                    "Server did not accept the credentials at {}",
                    config.server.url
                );
            }
        }

        KeyringCredentialStorage::store(&config.server.url, &config.server.username, &password)
            .with_context(|| {
                format!("Could not store the password; set {PASSWORD_ENV} instead")
            })?;
        config
            .save(&ctx.config_path)
            .context("Failed to write configuration file")?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "server": config.server.url,
                "username": config.server.username,
                "verified": !no_verify,
            }));
        } else {
            fmt.success(&format!(
                "Logged in to {} as {}",
                config.server.url, config.server.username
            ));
            fmt.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_logout(&self, ctx: &CliContext, forget_server: bool) -> Result<()> {
        let fmt = ctx.formatter();
        let mut config = ctx.load_config();

        if !config.server.is_configured() {
            fmt.info("No server configured. Nothing to log out.");
            return Ok(());
        }

        KeyringCredentialStorage::clear(&config.server.url, &config.server.username)?;
        if config.server.password.take().is_some() {
            warn!("Removed plain-text password from the config file");
        }
        if forget_server {
            config.server.url.clear();
            config.server.username.clear();
        }
        config.save(&ctx.config_path)?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({ "success": true }));
        } else {
            fmt.success("Logged out successfully");
            fmt.info("Password removed from keyring");
        }
        Ok(())
    }

    async fn execute_status(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = ctx.load_config();

        if !config.server.is_configured() {
            if ctx.is_json() {
                fmt.print_json(&serde_json::json!({ "configured": false }));
            } else {
                fmt.info("Server: not configured");
                fmt.info("Run 'notable-sync auth login' to add one");
            }
            return Ok(());
        }

        let source = password_source(&config);
        let reachable = match WebDavRemoteStore::from_config(&config) {
            Ok(Some(store)) => store.test_connection().await.unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Could not build WebDAV client");
                false
            }
        };

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "configured": true,
                "server": config.server.url,
                "username": config.server.username,
                "password_source": source.as_str(),
                "reachable": reachable,
            }));
        } else {
            fmt.success(&format!(
                "{} as {}",
                config.server.url, config.server.username
            ));
            fmt.field("Password", source.as_str());
            fmt.field("Reachable", if reachable { "yes" } else { "no" });
        }
        Ok(())
    }
}

fn password_source(config: &Config) -> PasswordSource {
    if config.server.password.as_deref().is_some_and(|p| !p.is_empty()) {
        return PasswordSource::ConfigFile;
    }
    if config.inline_password().is_some() {
        return PasswordSource::Environment;
    }
    match KeyringCredentialStorage::load(&config.server.url, &config.server.username) {
        Ok(Some(_)) => PasswordSource::Keyring,
        Ok(None) => PasswordSource::Missing,
        Err(e) => {
            warn!(error = %e, "Could not read keyring");
            PasswordSource::Missing
        }
    }
}

/// First line of `reader`, without the line ending
async fn read_password<R: AsyncBufRead + Unpin>(mut reader: R) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read password")?;
    let password = line.trim_end_matches(&['\r', '\n'][..]).to_string();
    if password.is_empty() {
        anyhow::bail!("Empty password");
    }
    Ok(password)
}
