//! Status command - Display synchronization status
//!
//! Provides the `notable-sync status` CLI command which shows:
//! 1. Whether a server is configured and sync is enabled
//! 2. The last completed cycle (watermark) and pending local changes
//! 3. Retry queue counts
//! 4. Remote reachability and pending remote changes, with `--remote`
//! 5. The most recent sync log lines

use anyhow::Result;
use clap::Args;
use notable_core::domain::{QueueStatus, SyncWatermark};
use tracing::warn;

use super::{CliContext, Session};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Also contact the server
    #[arg(long)]
    pub remote: bool,

    /// Number of log lines to show
    #[arg(long, default_value_t = 10)]
    pub log_lines: usize,
}

/// Server-side half of the report
#[derive(Debug, Default)]
struct RemoteStatus {
    reachable: bool,
    has_changes: Option<bool>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = Session::open(ctx).await?;
        let orchestrator = &session.orchestrator;

        let watermark = orchestrator.watermark().await?;
        let queue = orchestrator.queue_status().await?;
        let local_changes = orchestrator.has_local_changes().await?;

        let remote = if self.remote {
            let mut status = RemoteStatus {
                reachable: orchestrator.test_connection().await,
                has_changes: None,
            };
            if status.reachable {
                match orchestrator.has_remote_changes().await {
                    Ok(changes) => status.has_changes = Some(changes),
                    Err(e) => warn!(error = %e, "Could not list remote pages"),
                }
            }
            Some(status)
        } else {
            None
        };

        let log: Vec<String> = orchestrator
            .sync_log()
            .formatted()
            .into_iter()
            .take(self.log_lines)
            .collect();

        let fmt = ctx.formatter();
        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "device_id": orchestrator.device_id().to_string(),
                "configured": orchestrator.is_configured(),
                "enabled": session.config.sync.enabled,
                "server": session.config.server.url,
                "last_sync": last_sync_label(watermark),
                "watermark": watermark.as_millis(),
                "has_local_changes": local_changes,
                "queue": queue,
                "remote": remote.as_ref().map(|r| serde_json::json!({
                    "reachable": r.reachable,
                    "has_changes": r.has_changes,
                })),
                "log": log,
            }));
            return Ok(());
        }

        fmt.success("Notable sync status");
        fmt.info("");
        fmt.field("Device", &orchestrator.device_id().to_string());
        fmt.field(
            "Server",
            if orchestrator.is_configured() {
                session.config.server.url.as_str()
            } else {
                "not configured"
            },
        );
        fmt.field(
            "Sync",
            if session.config.sync.enabled {
                "enabled"
            } else {
                "disabled"
            },
        );
        fmt.field("Last sync", &last_sync_label(watermark));
        fmt.field("Local changes", yes_no(local_changes));
        fmt.field("Queue", &queue_label(&queue));

        if let Some(remote) = &remote {
            fmt.field("Reachable", yes_no(remote.reachable));
            if let Some(changes) = remote.has_changes {
                fmt.field("Remote changes", yes_no(changes));
            }
        }

        if queue.failed > 0 {
            fmt.warn(&format!(
                "{} queued operation(s) gave up; run 'notable-sync queue retry-failed'",
                queue.failed
            ));
        }

        if !log.is_empty() {
            fmt.info("");
            fmt.info("Recent activity:");
            for line in &log {
                fmt.info(&format!("  {line}"));
            }
        }
        Ok(())
    }
}

/// Probe the account root and the sync root
#[derive(Debug, Args)]
pub struct TestConnectionCommand {}

impl TestConnectionCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = Session::open(ctx).await?;
        let fmt = ctx.formatter();
        let configured = session.orchestrator.is_configured();
        let reachable = configured && session.orchestrator.test_connection().await;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "configured": configured,
                "server": session.config.server.url,
                "reachable": reachable,
            }));
        } else if !configured {
            fmt.error("No WebDAV server configured. Run 'notable-sync auth login' first.");
        } else if reachable {
            fmt.success(&format!("{} is reachable", session.config.server.url));
        } else {
            fmt.error(&format!("Cannot reach {}", session.config.server.url));
        }

        if reachable {
            Ok(())
        } else {
            anyhow::bail!("Connection test failed")
        }
    }
}

fn last_sync_label(watermark: SyncWatermark) -> String {
    if watermark.is_zero() {
        "never".to_string()
    } else {
        watermark
            .as_datetime()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

fn queue_label(status: &QueueStatus) -> String {
    if !status.has_items() {
        return "empty".to_string();
    }
    format!("{} pending, {} failed", status.pending, status.failed)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_sync_never() {
        assert_eq!(last_sync_label(SyncWatermark::ZERO), "never");
    }

    #[test]
    fn test_last_sync_formats_date() {
        let label = last_sync_label(SyncWatermark::from_millis(1_700_000_000_000));
        assert!(label.starts_with("2023-11-1"));
    }

    #[test]
    fn test_queue_label() {
        assert_eq!(queue_label(&QueueStatus::default()), "empty");
        let status = QueueStatus {
            pending: 2,
            failed: 1,
            total: 3,
        };
        assert_eq!(queue_label(&status), "2 pending, 1 failed");
    }
}
