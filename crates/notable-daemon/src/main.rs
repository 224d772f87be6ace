//! Notable daemon - Background synchronization service
//!
//! This binary runs as a user service and handles:
//! - Periodic bidirectional sync with the WebDAV server
//! - Replaying the retry queue when the server becomes reachable again
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires SQLite stores, the filesystem image store and the
//! WebDAV remote into a `SyncOrchestrator`, then hands it to a
//! `SyncScheduler`. Shutdown is driven by the orchestrator's
//! `CancellationToken`, which a signal task cancels on SIGTERM or SIGINT.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use notable_cache::{
    DatabasePool, SqliteDeletionLogRepository, SqliteLocalStore, SqliteSyncQueueRepository,
    SqliteSyncStateStore,
};
use notable_core::{config::Config, ports::IRemoteStore};
use notable_sync::{
    scheduler::DEFAULT_PROBE_INTERVAL, FsImageStore, SyncOrchestrator, SyncPorts, SyncScheduler,
};
use notable_webdav::WebDavRemoteStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "notabled", version, about = "Notable sync daemon")]
struct Args {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the wired orchestrator and the configuration it was built from
struct DaemonService {
    config: Config,
    orchestrator: Arc<SyncOrchestrator>,
    /// Kept open for the lifetime of the daemon
    _db_pool: DatabasePool,
}

impl DaemonService {
    /// Opens the database and builds every port the orchestrator needs
    ///
    /// A missing server or password is not an error: the orchestrator runs
    /// without a remote and reports NOT_CONFIGURED on each cycle.
    async fn new(config: Config) -> Result<Self> {
        for dir in [config.storage.database.parent(), Some(config.storage.images_dir.as_path())]
            .into_iter()
            .flatten()
        {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let db_pool = DatabasePool::new(Path::new(&config.storage.database))
            .await
            .context("Failed to open database")?;
        let pool = db_pool.pool().clone();

        let state = Arc::new(SqliteSyncStateStore::new(pool.clone()));
        let device_id = state
            .get_or_create_device_id()
            .await
            .context("Failed to load device id")?;

        let remote = match WebDavRemoteStore::from_config(&config) {
            Ok(Some(store)) => Some(Arc::new(store) as Arc<dyn IRemoteStore>),
            Ok(None) => {
                warn!("WebDAV server not configured; sync cycles will be skipped");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to build WebDAV client");
                None
            }
        };

        let ports = SyncPorts {
            local: Arc::new(SqliteLocalStore::new(pool.clone())),
            remote,
            images: Arc::new(FsImageStore::new(config.storage.images_dir.clone())),
            queue: Arc::new(SqliteSyncQueueRepository::new(pool.clone())),
            deletions: Arc::new(SqliteDeletionLogRepository::new(pool)),
            watermark: state,
        };
        let orchestrator = Arc::new(SyncOrchestrator::new(ports, &config.sync, device_id));

        info!(
            device_id = %device_id,
            database = %config.storage.database.display(),
            "Daemon service initialized"
        );

        Ok(Self {
            config,
            orchestrator,
            _db_pool: db_pool,
        })
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.orchestrator.cancellation_token()
    }

    /// Runs the scheduler until shutdown
    async fn run(&self) -> Result<()> {
        if !self.config.sync.enabled {
            warn!("Sync is disabled in the configuration; cycles will be no-ops");
        }

        let cancel = self.shutdown_token();
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown requested before the scheduler started");
                return Ok(());
            }
            _ = self.publish_device_record() => {}
        }

        let (scheduler, _requested) = SyncScheduler::new(
            self.orchestrator.clone(),
            sync_interval(&self.config),
            DEFAULT_PROBE_INTERVAL,
        );
        scheduler.run().await;
        Ok(())
    }

    async fn publish_device_record(&self) {
        if self.orchestrator.test_connection().await {
            if let Err(e) = self.orchestrator.update_device_info().await {
                warn!(error = %e, "Failed to publish device record");
            }
        }
    }
}

/// Interval between scheduled cycles, never shorter than one second
fn sync_interval(config: &Config) -> Duration {
    Duration::from_secs(config.sync.interval_secs.max(1))
}

// ============================================================================
// Logging
// ============================================================================

/// `RUST_LOG` wins over the configured level
fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
}

fn init_tracing(config: &Config) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true);

    match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.init(),
    }
    Ok(())
}

// ============================================================================
// Signal handling
// ============================================================================

/// Waits for SIGINT or SIGTERM, then cancels `token`
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
        _ = token.cancelled() => return,
    }

    token.cancel();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    init_tracing(&config)?;
    info!(config = %config_path.display(), "Notable daemon starting (notabled)");

    for problem in config.validate() {
        warn!(field = %problem.field, "{}", problem.message);
    }

    let service = DaemonService::new(config).await?;

    let signal_token = service.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let result = service.run().await;

    match &result {
        Ok(()) => info!("Notable daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Notable daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
