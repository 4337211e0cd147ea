use std::path::PathBuf;

use crate::retry::RetryConfig;
use crate::sink::object_store::{MAX_UPLOAD_PARTS, MIN_PART_SIZE};
use crate::sink::{MultipartConfig, SinkTarget};

/// Validated settings for a `migrate` run.
pub struct Config {
    pub input_directory: String,
    pub dropbox_token: String,
    pub status_file: PathBuf,
    /// `None` lists the source tree without transferring anything.
    pub target: Option<SinkTarget>,
    pub multipart: MultipartConfig,
    pub retry: RetryConfig,
    pub progress: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("input_directory", &self.input_directory)
            .field("dropbox_token", &"<redacted>")
            .field("status_file", &self.status_file)
            .field("target", &self.target)
            .field("multipart", &self.multipart)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(args: crate::cli::MigrateArgs) -> anyhow::Result<Self> {
        let input_directory = args.input_directory.trim().to_string();
        if input_directory.is_empty() {
            anyhow::bail!("--input-directory must not be empty");
        }
        if args.dropbox_token.trim().is_empty() {
            anyhow::bail!("--dropbox-token (or DROPBOX_TOKEN) must not be empty");
        }
        if args.part_size < MIN_PART_SIZE {
            anyhow::bail!(
                "--part-size must be at least {} bytes, got {}",
                MIN_PART_SIZE,
                args.part_size
            );
        }
        if !(1..=MAX_UPLOAD_PARTS).contains(&args.max_upload_parts) {
            anyhow::bail!(
                "--max-upload-parts must be between 1 and {}, got {}",
                MAX_UPLOAD_PARTS,
                args.max_upload_parts
            );
        }

        let target = match (args.output_directory, args.output_bucket) {
            (Some(_), Some(_)) => {
                anyhow::bail!("--output-directory and --output-bucket are mutually exclusive")
            }
            (Some(dir), None) => Some(SinkTarget::Directory(expand_tilde(&dir))),
            (None, Some(bucket)) => Some(SinkTarget::Bucket(bucket)),
            (None, None) => None,
        };

        Ok(Self {
            input_directory,
            dropbox_token: args.dropbox_token,
            status_file: expand_tilde(&args.status_file),
            target,
            multipart: MultipartConfig {
                part_size: args.part_size,
                max_parts: args.max_upload_parts,
            },
            retry: RetryConfig {
                max_retries: args.max_retries,
                base_delay_secs: args.retry_delay,
                max_delay_secs: 60,
            },
            progress: !args.disable_progressbar,
        })
    }
}
