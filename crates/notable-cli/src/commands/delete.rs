//! Delete commands - Remove a notebook or page locally and on the server
//!
//! The deletion is recorded as a tombstone first, so other devices stop
//! re-uploading the item even when the server cannot be reached now.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::{report_outcome, CliContext, Session};

#[derive(Debug, Args)]
pub struct DeleteCommand {
    #[command(subcommand)]
    pub target: DeleteTarget,

    /// Push the deletion to the server right away
    #[arg(long, global = true)]
    pub now: bool,
}

#[derive(Debug, Subcommand)]
pub enum DeleteTarget {
    /// Delete a notebook and all of its pages
    Notebook {
        /// Notebook id
        id: String,
    },
    /// Delete a single page
    Page {
        /// Page id
        id: String,
    },
}

impl DeleteCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let session = Session::open(ctx).await?;
        let orchestrator = &session.orchestrator;
        let (kind, id) = match &self.target {
            DeleteTarget::Notebook { id } => {
                orchestrator.delete_notebook(id).await?;
                ("notebook", id)
            }
            DeleteTarget::Page { id } => {
                orchestrator.delete_page(id).await?;
                ("page", id)
            }
        };

        let fmt = ctx.formatter();
        if ctx.is_json() && !self.now {
            fmt.print_json(&serde_json::json!({ "deleted": id, "type": kind }));
        } else {
            fmt.success(&format!("Deleted {kind} {id}"));
        }

        if self.now {
            return report_outcome(ctx, "Deletion sync", orchestrator.sync_deletions().await);
        }
        fmt.info("The deletion reaches the server on the next sync.");
        Ok(())
    }
}
