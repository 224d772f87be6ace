//! Sync command - Run a sync cycle against the WebDAV server
//!
//! Without flags a full bidirectional cycle runs: push local changes,
//! pull remote ones, then advance the watermark. The flags narrow the
//! cycle to one direction or one page. `notebook <id>` pushes a single
//! notebook the way closing it in the app does.

use anyhow::Result;
use clap::Args;
use notable_core::domain::SyncOutcome;
use tracing::info;

use super::{report_outcome, CliContext, Session};

#[derive(Debug, Args)]
pub struct NotebookCommand {
    /// Notebook id
    pub id: String,

    /// Go through the auto-sync path: skipped when auto-sync is off or the
    /// server does not answer
    #[arg(long)]
    pub auto: bool,
}

impl NotebookCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = Session::open(ctx).await?;
        let outcome = if self.auto {
            session
                .orchestrator
                .spawn_auto_sync(&self.id)
                .await?
                .unwrap_or(SyncOutcome::Error)
        } else {
            session.orchestrator.sync_notebook(&self.id).await
        };
        report_outcome(ctx, "Notebook sync", outcome)
    }
}

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Upload local changes only
    #[arg(long, conflicts_with = "pull_only")]
    pub push_only: bool,

    /// Download remote changes only
    #[arg(long)]
    pub pull_only: bool,

    /// Upload a single page
    #[arg(long, value_name = "ID", conflicts_with_all = ["push_only", "pull_only"])]
    pub page: Option<String>,

    /// Replay the retry queue after the cycle
    #[arg(long)]
    pub with_queue: bool,
}

/// Which orchestrator entry point a set of flags selects
#[derive(Debug, PartialEq)]
enum SyncScope<'a> {
    Both,
    Push,
    Pull,
    Page(&'a str),
}

impl SyncCommand {
    fn scope(&self) -> SyncScope<'_> {
        if let Some(id) = self.page.as_deref() {
            SyncScope::Page(id)
        } else if self.push_only {
            SyncScope::Push
        } else if self.pull_only {
            SyncScope::Pull
        } else {
            SyncScope::Both
        }
    }

    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = Session::open(ctx).await?;
        let orchestrator = &session.orchestrator;
        let scope = self.scope();
        info!(?scope, "Running sync");

        let (action, outcome) = match scope {
            SyncScope::Both => ("Sync", orchestrator.sync_bidirectional().await),
            SyncScope::Push => ("Push", orchestrator.sync_all().await),
            SyncScope::Pull => ("Pull", orchestrator.pull_changes().await),
            SyncScope::Page(id) => ("Page sync", orchestrator.sync_page(id).await),
        };

        if !ctx.is_json() {
            let fmt = ctx.formatter();
            for line in orchestrator.sync_log().formatted().iter().rev() {
                fmt.info(line);
            }
        }
        let result = report_outcome(ctx, action, outcome);

        if self.with_queue && result.is_ok() {
            let queued = orchestrator.retry_queued_operations().await;
            report_outcome(ctx, "Queue replay", queued)?;
        }
        result
    }
}
