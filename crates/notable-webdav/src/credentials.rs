//! Server password storage in the system keyring
//!
//! Passwords are stored under the service name "notable-sync" with
//! `{username}@{server}` as the account, so several servers can coexist.

use anyhow::{Context, Result};
use tracing::{debug, info};

use notable_core::config::Config;

const KEYRING_SERVICE: &str = "notable-sync";

/// Stores and retrieves WebDAV passwords from the OS credential store
/// (GNOME Keyring, KDE Wallet, macOS Keychain).
pub struct KeyringCredentialStorage;

impl KeyringCredentialStorage {
    fn account(server: &str, username: &str) -> String {
        format!("{}@{}", username, server.trim_end_matches('/'))
    }

    pub fn store(server: &str, username: &str, password: &str) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &Self::account(server, username))
            .context("Failed to create keyring entry")?;

        entry
            .set_password(password)
            .context("Failed to store password in keyring")?;

        debug!("Stored password in keyring for {}", username);
        Ok(())
    }

    /// `None` when nothing is stored for this server and user
    pub fn load(server: &str, username: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &Self::account(server, username))
            .context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => {
                debug!("No password in keyring for {}", username);
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    pub fn clear(server: &str, username: &str) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &Self::account(server, username))
            .context("Failed to create keyring entry")?;

        match entry.delete_credential() {
            Ok(()) => {
                info!("Cleared keyring password for {}", username);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No password to clear for {}", username);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }

    /// Password for the configured server
    ///
    /// Order: config file, `NOTABLE_SYNC_PASSWORD`, keyring.
    pub fn resolve(config: &Config) -> Result<Option<String>> {
        if let Some(password) = config.inline_password() {
            return Ok(Some(password));
        }
        if !config.server.is_configured() {
            return Ok(None);
        }
        Self::load(&config.server.url, &config.server.username)
    }
}
