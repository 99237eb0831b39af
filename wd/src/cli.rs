//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::QueueKind;

/// warmd - cache warming and purge daemon
#[derive(Parser)]
#[command(
    name = "wd",
    about = "Queue-backed cache preload and purge daemon",
    version,
    after_help = "Logs are written to: ~/.local/share/warmd/logs/warmd.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the worker, sweeper and trigger endpoint in the foreground
    Start,

    /// Queue URLs for cache warming
    Preload {
        #[command(flatten)]
        urls: UrlArgs,
    },

    /// Queue URLs for cache eviction
    Purge {
        #[command(flatten)]
        urls: UrlArgs,
    },

    /// Process a queue until it is empty
    Run {
        /// Queue name (preload, purge)
        queue: QueueKind,
    },

    /// Show per-queue counts
    Stats {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List tasks of a queue in claim order
    List {
        /// Queue name (preload, purge)
        queue: QueueKind,

        /// Maximum tasks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Return abandoned processing tasks to pending
    ResetStale {
        /// Queue name; all queues when omitted
        queue: Option<QueueKind>,
    },

    /// Move parked (failed) tasks back to pending
    Requeue {
        /// Queue name (preload, purge)
        queue: QueueKind,
    },

    /// Delete every task of a queue
    Clear {
        /// Queue name (preload, purge)
        queue: QueueKind,
    },
}

/// URL inputs shared by preload and purge
#[derive(clap::Args, Debug)]
pub struct UrlArgs {
    /// URLs to queue
    pub urls: Vec<String>,

    /// Read more URLs from a file, one per line
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Queue priority; higher runs first
    #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
    pub priority: i64,

    /// Process the queue in this process instead of nudging a daemon
    #[arg(long)]
    pub run: bool,
}

/// Output format for stats
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text, json", s)),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warmd")
        .join("logs")
        .join("warmd.log")
}

/// Collect URLs from arguments and an optional file; blank lines and `#` comments are skipped
pub fn collect_urls(args: &UrlArgs) -> std::io::Result<Vec<String>> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path)?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }
    Ok(urls)
}
