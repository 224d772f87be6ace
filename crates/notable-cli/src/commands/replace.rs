//! Replace command - Make one side an exact copy of the other
//!
//! `replace local` wipes local notes and downloads everything from the
//! server. `replace server` deletes every remote note file and uploads
//! the local set. Both are destructive and require `--yes`.

use anyhow::Result;
use clap::{Args, ValueEnum};
use tracing::warn;

use super::{report_outcome, CliContext, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplaceTarget {
    /// Overwrite local notes with the server copy
    Local,
    /// Overwrite the server with local notes
    Server,
}

#[derive(Debug, Args)]
pub struct ReplaceCommand {
    /// Side to overwrite
    #[arg(value_enum)]
    pub target: ReplaceTarget,

    /// Confirm the destructive operation
    #[arg(long)]
    pub yes: bool,
}

impl ReplaceCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        if !self.yes {
            let fmt = ctx.formatter();
            fmt.error(&format!(
                "This discards everything on the {} side. Re-run with --yes to continue.",
                self.side()
            ));
            anyhow::bail!("Replace not confirmed");
        }

        let session = Session::open(ctx).await?;
        warn!(side = self.side(), "Replacing all data on one side");

        let outcome = match self.target {
            ReplaceTarget::Local => session.orchestrator.replace_local_with_server().await,
            ReplaceTarget::Server => session.orchestrator.replace_server_with_local().await,
        };
        report_outcome(ctx, "Replace", outcome)
    }

    fn side(&self) -> &'static str {
        match self.target {
            ReplaceTarget::Local => "local",
            ReplaceTarget::Server => "server",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    #[tokio::test]
    async fn test_unconfirmed_replace_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext::new(
            OutputFormat::Json,
            Some(dir.path().join("config.yaml")),
            true,
        );
        let cmd = ReplaceCommand {
            target: ReplaceTarget::Server,
            yes: false,
        };
        assert!(cmd.execute(&ctx).await.is_err());
        assert!(!dir.path().join("config.yaml").exists());
    }
}
