//! Queue commands - Inspect and drive the retry queue

use anyhow::Result;
use clap::Subcommand;
use notable_core::domain::SyncQueueEntry;

use super::{report_outcome, CliContext, Session};

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queued operations
    List,
    /// Replay entries whose retry time has come
    Retry,
    /// Revive entries that gave up, then replay
    RetryFailed,
    /// Drop entries that gave up
    ClearFailed,
    /// Drop every entry
    ClearAll,
}

impl QueueCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = Session::open(ctx).await?;
        let orchestrator = &session.orchestrator;
        let fmt = ctx.formatter();

        match self {
            QueueCommand::List => {
                let entries = orchestrator.queue().entries().await?;
                if ctx.is_json() {
                    fmt.print_json(&serde_json::to_value(&entries)?);
                } else if entries.is_empty() {
                    fmt.success("Queue is empty");
                } else {
                    fmt.success(&format!("{} queued operation(s)", entries.len()));
                    for entry in &entries {
                        fmt.info(&describe(entry));
                    }
                }
                Ok(())
            }
            QueueCommand::Retry => {
                report_outcome(ctx, "Queue replay", orchestrator.retry_queued_operations().await)
            }
            QueueCommand::RetryFailed => report_outcome(
                ctx,
                "Failed queue replay",
                orchestrator.retry_failed_operations().await,
            ),
            QueueCommand::ClearFailed => {
                let removed = orchestrator.clear_failed_queue_entries().await?;
                print_removed(ctx, removed);
                Ok(())
            }
            QueueCommand::ClearAll => {
                let removed = orchestrator.clear_all_queue_entries().await?;
                print_removed(ctx, removed);
                Ok(())
            }
        }
    }
}

fn print_removed(ctx: &CliContext, removed: u64) {
    let fmt = ctx.formatter();
    if ctx.is_json() {
        fmt.print_json(&serde_json::json!({ "removed": removed }));
    } else {
        let noun = if removed == 1 { "entry" } else { "entries" };
        fmt.success(&format!("Removed {removed} queue {noun}"));
    }
}

/// One line per entry: operation, target, attempts and when it runs next
fn describe(entry: &SyncQueueEntry) -> String {
    let next = match entry.next_retry_at {
        _ if entry.is_exhausted() => "gave up".to_string(),
        Some(at) => format!(
            "next {}",
            at.with_timezone(&chrono::Local).format("%H:%M:%S")
        ),
        None => "dormant".to_string(),
    };
    let mut line = format!(
        "{:<22} {:<38} {}/{} attempts, {}",
        entry.operation.as_str(),
        entry.target_id,
        entry.retry_count,
        entry.max_retries,
        next
    );
    if let Some(error) = &entry.error_message {
        line.push_str(&format!("\n      last error: {error}"));
    }
    line
}
