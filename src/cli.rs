// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;
use crate::types::{ContextDepth, Priority};

/// Command-line arguments for `tradesight`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tradesight",
    version,
    about = "Analyze trade-surveillance alerts through the task graph and print a recommendation.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the engine config file (TOML).
    ///
    /// A missing file at the default location falls back to built-in defaults.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Path to the backend fixture file (TOML) describing alerts, market data
    /// and backend availability.
    #[arg(long, value_name = "PATH")]
    pub fixtures: Option<String>,

    /// Alert to analyze. Repeat to analyze several alerts concurrently.
    #[arg(long = "alert-id", value_name = "ID")]
    pub alert_ids: Vec<String>,

    /// Priority attached to every request (low, medium, high).
    #[arg(long, value_name = "PRIORITY", default_value = "medium")]
    pub priority: Priority,

    /// Context depth (summary, full).
    #[arg(long, value_name = "DEPTH", default_value = "summary")]
    pub context_depth: ContextDepth,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TRADESIGHT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved config and task graph, but don't
    /// analyze anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Also print the audit trail of every run.
    #[arg(long)]
    pub show_audit: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
