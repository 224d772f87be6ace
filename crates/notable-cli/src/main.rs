//! Notable sync CLI - Command-line interface for the Notable sync engine
//!
//! Provides commands for:
//! - Running push, pull and bidirectional sync cycles
//! - Viewing sync status and the retry queue
//! - Replacing one side with the other
//! - Deleting notebooks and pages with tombstones
//! - Managing WebDAV credentials and configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, config::ConfigCommand, delete::DeleteCommand, queue::QueueCommand,
    replace::ReplaceCommand,
    status::{StatusCommand, TestConnectionCommand},
    sync::{NotebookCommand, SyncCommand},
    CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "notable-sync",
    version,
    about = "Sync Notable notebooks with a WebDAV server"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store or remove WebDAV credentials
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Synchronize notes with the server
    Sync(SyncCommand),
    /// Push one notebook and its pages
    Notebook(NotebookCommand),
    /// Show synchronization status
    Status(StatusCommand),
    /// Check that the server answers with the stored credentials
    TestConnection(TestConnectionCommand),
    /// Inspect and retry queued operations
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Overwrite one side with the other
    Replace(ReplaceCommand),
    /// Delete a notebook or page and propagate the deletion
    Delete(DeleteCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Verbosity flag to filter, `warn` when quiet
fn default_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = default_filter(cli.verbose, cli.quiet);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext::new(format, cli.config, cli.quiet);

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Notebook(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::TestConnection(cmd) => cmd.execute(&ctx).await,
        Commands::Queue(cmd) => cmd.execute(&ctx).await,
        Commands::Replace(cmd) => cmd.execute(&ctx).await,
        Commands::Delete(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
