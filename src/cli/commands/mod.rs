//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod parse;
mod purge;
mod stats;
mod watch;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{Config, Overrides, Settings};

/// Log verbosity for the `threadwatch` target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "threadwatch")]
#[command(about = "Watch a threaded comment feed and post new comments to a webhook")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: ./threadwatch.toml if present)
    #[arg(short, long, global = true, env = "THREADWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, value_enum, env = "LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Feed page to monitor
    #[arg(long, global = true, env = "TARGET_URL")]
    target_url: Option<String>,

    /// Discord webhook URL for alerts
    #[arg(long, global = true, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: Option<String>,

    /// Minutes between monitoring cycles
    #[arg(long = "interval", global = true, env = "SCRAPE_INTERVAL_MINUTES")]
    interval_minutes: Option<u64>,

    /// Ledger database file
    #[arg(long = "db", global = true, env = "DB_PATH")]
    database_path: Option<String>,

    /// Number of newest pages to scan each cycle
    #[arg(long, global = true, env = "PAGES_TO_SCAN")]
    pages: Option<u32>,

    /// Purge comments first seen more than this many days ago, every cycle
    #[arg(long, global = true, env = "RETENTION_DAYS")]
    retention_days: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Default tracing filter when RUST_LOG is unset.
    pub fn log_filter(&self) -> String {
        let level = if self.verbose {
            LogLevel::Debug
        } else {
            self.log_level
        };
        format!("threadwatch={}", level.as_str())
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            target_url: self.target_url.clone(),
            webhook_url: self.webhook_url.clone(),
            interval_minutes: self.interval_minutes,
            database_path: self.database_path.clone(),
            pages: self.pages,
            retention_days: self.retention_days,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger database and its schema
    Init,

    /// Monitor the feed: one cycle now, then one per interval
    Watch {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Show ledger size and the most recently seen comments
    Stats {
        /// Number of recent comments to list
        #[arg(long, default_value = "10")]
        recent: i64,
    },

    /// Delete comments first seen more than N days ago
    Purge {
        /// Retention window in days
        #[arg(long)]
        days: u32,
    },

    /// Parse a saved HTML page offline and report what was found
    Parse {
        /// HTML file to parse
        file: PathBuf,
        /// Page number to attribute the comments to
        #[arg(long, default_value = "1")]
        page: u32,
        /// Base URL for permalinks (default: the configured target URL)
        #[arg(long)]
        base_url: Option<String>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    let settings = Settings::resolve(config, &cli.overrides());

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Watch { once } => watch::cmd_watch(&settings, once).await,
        Commands::Stats { recent } => stats::cmd_stats(&settings, recent).await,
        Commands::Purge { days } => purge::cmd_purge(&settings, days).await,
        Commands::Parse {
            file,
            page,
            base_url,
        } => parse::cmd_parse(&settings, &file, page, base_url.as_deref()).await,
    }
}
