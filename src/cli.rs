use clap::{Args, Parser, Subcommand};

use crate::sink::object_store::{DEFAULT_PART_SIZE, MAX_UPLOAD_PARTS};
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "boxmover",
    version,
    about = "Copy a Dropbox folder to a local directory or an S3 bucket, resuming where the last run stopped"
)]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Transfer every file under a Dropbox folder
    Migrate(MigrateArgs),
    /// Summarize a status file from an earlier run
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Dropbox folder to copy, e.g. /Photos
    #[arg(short = 'i', long)]
    pub input_directory: String,

    /// Local directory to copy into
    #[arg(short = 'o', long, conflicts_with = "output_bucket")]
    pub output_directory: Option<String>,

    /// S3 bucket to copy into (credentials and region from the AWS environment)
    #[arg(short = 'b', long)]
    pub output_bucket: Option<String>,

    /// Dropbox access token.
    /// Prefer the DROPBOX_TOKEN environment variable over the flag.
    #[arg(long, env = "DROPBOX_TOKEN", hide_env_values = true)]
    pub dropbox_token: String,

    /// Disable the per-file progress bar
    #[arg(long)]
    pub disable_progressbar: bool,

    /// Per-file status, read at start and rewritten at exit
    #[arg(long, default_value = "upload-status.json")]
    pub status_file: String,

    /// Multipart upload part size in bytes
    #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
    pub part_size: u64,

    /// Maximum number of parts per uploaded object
    #[arg(long, default_value_t = MAX_UPLOAD_PARTS)]
    pub max_upload_parts: u32,

    /// Max retries per listing page or download request (0 = no retries)
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Initial retry delay in seconds
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Status file to read
    #[arg(long, default_value = "upload-status.json")]
    pub status_file: String,

    /// List failed paths with their errors
    #[arg(long)]
    pub failed: bool,
}
