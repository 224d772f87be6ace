//! CLI subcommands and the wiring they share

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use notable_cache::{
    DatabasePool, SqliteDeletionLogRepository, SqliteLocalStore, SqliteSyncQueueRepository,
    SqliteSyncStateStore,
};
use notable_core::{config::Config, domain::SyncOutcome, ports::IRemoteStore};
use notable_sync::{FsImageStore, SyncOrchestrator, SyncPorts};
use notable_webdav::WebDavRemoteStore;
use tracing::{debug, info};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

pub mod auth;
pub mod config;
pub mod delete;
pub mod queue;
pub mod replace;
pub mod status;
pub mod sync;

// ============================================================================
// CliContext
// ============================================================================

/// Global flags every subcommand needs
#[derive(Debug, Clone)]
pub struct CliContext {
    pub format: OutputFormat,
    pub config_path: PathBuf,
    pub quiet: bool,
}

impl CliContext {
    pub fn new(format: OutputFormat, config_path: Option<PathBuf>, quiet: bool) -> Self {
        Self {
            format,
            config_path: config_path.unwrap_or_else(Config::default_path),
            quiet,
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn load_config(&self) -> Config {
        debug!(config_path = %self.config_path.display(), "Loading configuration");
        Config::load_or_default(&self.config_path)
    }
}

// ============================================================================
// Session
// ============================================================================

/// An orchestrator wired to the configured database, image directory and server
pub struct Session {
    pub config: Config,
    pub orchestrator: Arc<SyncOrchestrator>,
    _db_pool: DatabasePool,
}

impl Session {
    /// Loads the configuration and opens every store
    pub async fn open(ctx: &CliContext) -> Result<Self> {
        Self::from_config(ctx.load_config()).await
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        if let Some(parent) = config.storage.database.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create data directory")?;
        }
        let db_pool = DatabasePool::new(&config.storage.database)
            .await
            .context("Failed to open database")?;
        let pool = db_pool.pool().clone();

        let state = Arc::new(SqliteSyncStateStore::new(pool.clone()));
        let device_id = state
            .get_or_create_device_id()
            .await
            .context("Failed to load device id")?;

        let remote = WebDavRemoteStore::from_config(&config)?
            .map(|store| Arc::new(store) as Arc<dyn IRemoteStore>);

        let ports = SyncPorts {
            local: Arc::new(SqliteLocalStore::new(pool.clone())),
            remote,
            images: Arc::new(FsImageStore::new(config.storage.images_dir.clone())),
            queue: Arc::new(SqliteSyncQueueRepository::new(pool.clone())),
            deletions: Arc::new(SqliteDeletionLogRepository::new(pool)),
            watermark: state,
        };
        let orchestrator = Arc::new(SyncOrchestrator::new(ports, &config.sync, device_id));

        info!(device_id = %device_id, "Opened sync session");
        Ok(Self {
            config,
            orchestrator,
            _db_pool: db_pool,
        })
    }
}

// ============================================================================
// Outcome reporting
// ============================================================================

/// Print an outcome and turn failures into a non-zero exit
pub fn report_outcome(ctx: &CliContext, action: &str, outcome: SyncOutcome) -> Result<()> {
    let fmt = ctx.formatter();

    if ctx.is_json() {
        fmt.print_json(&serde_json::json!({
            "action": action,
            "outcome": outcome,
            "success": outcome.is_terminal_success(),
        }));
    } else {
        match outcome {
            SyncOutcome::Success => fmt.success(&format!("{action} completed")),
            SyncOutcome::UpToDate => fmt.success(&format!("{action}: already up to date")),
            SyncOutcome::PartialSuccess => {
                fmt.warn(&format!("{action} partially succeeded; failures were queued"))
            }
            SyncOutcome::Disabled => fmt.warn("Sync is disabled (sync.enabled = false)"),
            SyncOutcome::NotConfigured => fmt.error(
                "No WebDAV server configured. Run 'notable-sync auth login' first.",
            ),
            other => fmt.error(&format!("{action} failed ({other})")),
        }
    }

    match outcome {
        SyncOutcome::Success | SyncOutcome::UpToDate | SyncOutcome::PartialSuccess => Ok(()),
        SyncOutcome::Disabled => Ok(()),
        other => anyhow::bail!("{action} finished with {other}"),
    }
}
