//! Configuration settings for partar
//!
//! Defines the CLI arguments, the resolved extraction configuration, and
//! their defaults.

use crate::error::{ExtractError, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of extraction workers
pub const DEFAULT_WORKERS: usize = 4;

/// partar - parallel tar extraction
#[derive(Parser, Debug, Clone)]
#[command(name = "partar")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract uncompressed tar archives with a pool of parallel workers")]
#[command(long_about = r#"
partar reads a tar archive once, front to back, and hands every regular file
to a pool of workers that copy its payload straight out of the archive at its
recorded offset. Directories are created in archive order before any file
beneath them is written. The first error stops the run.

Examples:
  partar backup.tar                       # Extract into the current directory
  partar -f backup.tar -C /restore -w 16  # 16 workers into /restore
  partar backup.tar -C /restore -u        # Skip files that already match
  partar backup.tar -v                    # List entries as they complete
"#)]
pub struct CliArgs {
    /// Archive to extract
    #[arg(value_name = "ARCHIVE", required_unless_present = "file")]
    pub archive: Option<PathBuf>,

    /// Archive to extract (alternative to the positional argument)
    #[arg(short = 'f', long, value_name = "ARCHIVE", conflicts_with = "archive")]
    pub file: Option<PathBuf>,

    /// Destination directory
    #[arg(short = 'C', long, default_value = ".", value_name = "DIR")]
    pub directory: PathBuf,

    /// Number of parallel workers (0 = one per CPU)
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKERS, value_name = "NUM", env = "PARTAR_WORKERS")]
    pub workers: usize,

    /// Jobs buffered between the reader and the workers (default: worker count)
    #[arg(long, value_name = "NUM")]
    pub queue_depth: Option<usize>,

    /// Skip files whose size and mode already match
    #[arg(short = 'u', long)]
    pub update: bool,

    /// Verbose output (can be repeated: -v lists entries, -vv, -vvv for debug logs)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress the summary)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Show a progress bar
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Do not reserve space before copying
    #[arg(long)]
    pub no_preallocate: bool,

    /// Do not restore modification times
    #[arg(short = 'm', long = "touch")]
    pub touch: bool,

    /// Copy buffer size when the kernel cannot copy directly (e.g., 1M, 64K)
    #[arg(short = 'b', long, default_value = "1M", value_name = "SIZE")]
    pub buffer_size: String,

    /// Output format for the summary
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

/// Output format for the run summary
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Resolved configuration for one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Archive path
    pub archive: PathBuf,
    /// Destination root
    pub destination: PathBuf,
    /// Worker count (0 = one per CPU)
    pub workers: usize,
    /// Queue capacity; `None` means the worker count
    pub queue_depth: Option<usize>,
    /// Skip files whose size and mode already match
    pub update: bool,
    /// Print each entry as it is processed
    pub list_entries: bool,
    /// Verbosity level
    pub verbose: u8,
    /// Suppress the summary
    pub quiet: bool,
    /// Show a progress bar
    pub progress: bool,
    /// Reserve space before copying
    pub preallocate: bool,
    /// Restore modification times
    pub preserve_mtime: bool,
    /// User-space copy buffer in bytes
    pub buffer_size: usize,
    /// Summary format
    pub output_format: OutputFormat,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::new(),
            destination: PathBuf::from("."),
            workers: DEFAULT_WORKERS,
            queue_depth: None,
            update: false,
            list_entries: false,
            verbose: 0,
            quiet: false,
            progress: false,
            preallocate: true,
            preserve_mtime: true,
            buffer_size: crate::fs::DEFAULT_BUFFER_SIZE,
            output_format: OutputFormat::Text,
        }
    }
}

impl ExtractConfig {
    /// Configuration for extracting `archive` into `destination` with defaults
    pub fn new(archive: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> std::result::Result<Self, String> {
        let archive = args
            .file
            .as_ref()
            .or(args.archive.as_ref())
            .ok_or("Archive path required")?;

        let buffer_size = parse_size(&args.buffer_size)
            .map_err(|e| format!("Invalid buffer size: {}", e))?;

        Ok(Self {
            archive: archive.clone(),
            destination: args.directory.clone(),
            workers: args.workers,
            queue_depth: args.queue_depth,
            update: args.update,
            list_entries: args.verbose > 0,
            verbose: args.verbose,
            quiet: args.quiet,
            progress: args.progress && !args.quiet,
            preallocate: !args.no_preallocate,
            preserve_mtime: !args.touch,
            buffer_size: usize::try_from(buffer_size)
                .map_err(|_| format!("Buffer size too large: {}", args.buffer_size))?,
            output_format: args.output_format,
        })
    }

    /// Worker count with 0 resolved to the CPU count
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    /// Queue capacity with the default resolved
    pub fn effective_queue_depth(&self) -> usize {
        self.queue_depth
            .unwrap_or_else(|| self.effective_workers())
            .max(1)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.archive.as_os_str().is_empty() {
            return Err(ExtractError::config("no archive given"));
        }
        if self.queue_depth == Some(0) {
            return Err(ExtractError::config("queue depth must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(ExtractError::config("buffer size must be non-zero"));
        }
        if self.destination.exists() && !self.destination.is_dir() {
            return Err(ExtractError::config(format!(
                "destination '{}' is not a directory",
                self.destination.display()
            )));
        }
        Ok(())
    }
}

/// Parse size string (e.g., "1M", "64K", "1G")
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let digits_end = size
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size.len());
    let (num_str, suffix) = size.split_at(digits_end);

    let multiplier: u64 = match suffix.trim() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024u64 * 1024 * 1024 * 1024,
        other => return Err(format!("Unknown size suffix: {}", other)),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    Ok((num * multiplier as f64) as u64)
}
