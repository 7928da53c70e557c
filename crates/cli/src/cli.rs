//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Event Fan-out - deliver stream events to many output transports
#[derive(Parser, Debug)]
#[command(
    name = "event-fanout",
    author,
    version,
    about = "Fan stream events out to configured output transports",
    long_about = "Reads events for one output stream, routes each event to every configured\n\
                  transport (log, file, network) and dispatches sends through bounded\n\
                  per-transport worker pools, so a slow sink never stalls the pipeline."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EVENT_FANOUT_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "EVENT_FANOUT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed events through the configured transports
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "EVENT_FANOUT_CONFIG"
    )]
    pub config: PathBuf,

    /// JSON-lines event file (reads stdin when omitted)
    #[arg(short, long, env = "EVENT_FANOUT_INPUT")]
    pub input: Option<PathBuf>,

    /// Number of events handed to the fan-out per batch
    #[arg(long, default_value = "64", env = "EVENT_FANOUT_BATCH_SIZE")]
    pub batch_size: usize,

    /// Maximum number of events to read (0 = unlimited)
    #[arg(long, default_value = "0", env = "EVENT_FANOUT_MAX_EVENTS")]
    pub max_events: u64,

    /// Input timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "EVENT_FANOUT_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "EVENT_FANOUT_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed transport configuration
    #[arg(long)]
    pub transports: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
