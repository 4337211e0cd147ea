//! boxmover: resumable migration of a Dropbox tree to a local directory or
//! an S3 bucket.
//!
//! The source tree is listed in full, then each file is streamed from
//! Dropbox into the destination one at a time. Per-file outcomes are kept in
//! a JSON status file so a later run skips everything already transferred
//! and retries only what failed.

#![warn(clippy::all)]

mod checkpoint;
mod cli;
mod config;
pub mod retry;
mod shutdown;
mod sink;
mod source;
mod transfer;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use checkpoint::{CheckpointError, CheckpointStore, CheckpointSummary};
use cli::Command;
use shutdown::{ShutdownController, EXIT_INTERRUPTED};
use sink::Sink;
use source::DropboxClient;

/// Run the migrate command. Returns the process exit code.
async fn run_migrate(args: cli::MigrateArgs) -> anyhow::Result<i32> {
    let config = config::Config::from_cli(args)?;
    tracing::debug!(?config, "Starting boxmover");

    let checkpoint = Arc::new(CheckpointStore::load(&config.status_file));
    let cancel = CancellationToken::new();
    let controller = Arc::new(ShutdownController::new(cancel.clone(), checkpoint.clone()));
    shutdown::install_signal_handler(controller)?;

    // Saved when this function returns, on success and on error alike.
    let _flush = checkpoint.flush_on_drop();

    let client =
        DropboxClient::new(config.dropbox_token.as_str()).context("fail to build HTTP client")?;
    let files = source::list_files_recursively(
        &client,
        &config.input_directory,
        &config.retry,
        &cancel,
    )
    .await
    .with_context(|| format!("fail to list '{}'", config.input_directory))?;

    let sink = match &config.target {
        Some(target) => Some(Sink::from_target(target, config.multipart).await),
        None => None,
    };
    if let Some(sink) = &sink {
        tracing::info!(
            "Migrating {} files from '{}' to {}",
            files.len(),
            config.input_directory,
            sink.describe()
        );
    }

    let options = transfer::TransferOptions {
        progress: config.progress,
        retry: config.retry.clone(),
    };
    let summary = transfer::migrate(
        &client,
        sink.as_ref(),
        &files,
        &checkpoint,
        &options,
        &cancel,
    )
    .await;

    if summary.interrupted {
        tracing::info!(
            "Run interrupted; status kept in {}",
            config.status_file.display()
        );
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(0)
}

/// Run the status command.
fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let path = config::expand_tilde(&args.status_file);

    let records = match checkpoint::read_map(&path) {
        Ok(records) => records,
        Err(e) if e.is_missing() => {
            println!("No status file found at {}", path.display());
            println!("Run a migration first to create it.");
            return Ok(());
        }
        Err(e @ CheckpointError::Parse { .. }) => {
            return Err(e).context("status file is not valid JSON");
        }
        Err(e) => return Err(e.into()),
    };
    let summary = CheckpointSummary::from_map(&records);

    println!("Status file: {}", path.display());
    println!();
    println!("Files:");
    println!("  Total:      {}", summary.total);
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Failed:     {}", summary.failed);
    println!();
    if let Some(modified) = last_modified(&path) {
        println!("Last written: {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }

    if args.failed && summary.failed > 0 {
        println!();
        println!("Failed files:");
        for (file, record) in &records {
            if let Some(error) = &record.error {
                if !record.downloaded {
                    println!("  {} - {}", file, error);
                }
            }
        }
    }

    Ok(())
}

fn last_modified(path: &Path) -> Option<chrono::DateTime<chrono::Local>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let code = match cli.command {
        Command::Status(args) => {
            run_status(args)?;
            0
        }
        Command::Migrate(args) => run_migrate(args).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
