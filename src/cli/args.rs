//! CLI argument definitions
//!
//! All Clap derive structs for `greenlight` command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;
use crate::phase::channel::DEFAULT_FIFO_CAPACITY;
use crate::phase::{ChannelMode, RedrawPolicy};

// ============================================================================
// Root CLI
// ============================================================================

/// Simulated traffic signal with blocking phase waiters.
#[derive(Parser, Debug)]
#[command(name = "greenlight", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "GREENLIGHT_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "GREENLIGHT_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a signal with observers waiting for green.
    Run(RunArgs),

    /// Validate configuration files without running a signal.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Run Command
// ============================================================================

/// Arguments for `run`.
///
/// Flags override the matching values from `--config`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "GREENLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Signal name used in logs, metrics and events.
    #[arg(long)]
    pub name: Option<String>,

    /// Lower bound of the randomized phase duration (e.g. `4s`, `40ms`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub min_duration: Option<Duration>,

    /// Upper bound of the randomized phase duration.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub max_duration: Option<Duration>,

    /// Sleep between timer checks in the cycling loop.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// When a new phase duration is drawn.
    #[arg(long)]
    pub redraw: Option<RedrawArg>,

    /// Buffering mode of the transition feed.
    #[arg(long)]
    pub channel: Option<ChannelArg>,

    /// Queue capacity when `--channel fifo` is used.
    #[arg(long, default_value_t = DEFAULT_FIFO_CAPACITY)]
    pub fifo_capacity: usize,

    /// Number of observers blocking on `wait_for_green`.
    #[arg(long, default_value_t = 5, env = "GREENLIGHT_OBSERVERS")]
    pub observers: usize,

    /// Stop after this many phase transitions (runs until interrupted if unset).
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Fixed RNG seed for reproducible phase durations.
    #[arg(long, env = "GREENLIGHT_SEED")]
    pub seed: Option<u64>,

    /// Write JSONL events to this file instead of stdout.
    #[arg(long, env = "GREENLIGHT_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "GREENLIGHT_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

// ============================================================================
// Validate / Version
// ============================================================================

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Enable strict validation (warnings become errors).
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

/// Redraw policy on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RedrawArg {
    /// Draw one duration when cycling starts.
    PerRun,
    /// Draw a fresh duration for every phase.
    PerCycle,
}

impl From<RedrawArg> for RedrawPolicy {
    fn from(arg: RedrawArg) -> Self {
        match arg {
            RedrawArg::PerRun => Self::PerRun,
            RedrawArg::PerCycle => Self::PerCycle,
        }
    }
}

/// Transition feed mode on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    /// Keep only the most recent transition.
    Latest,
    /// Keep up to `--fifo-capacity` transitions in order.
    Fifo,
}

impl ChannelArg {
    /// Builds the channel mode, using `capacity` for FIFO.
    #[must_use]
    pub const fn to_mode(self, capacity: usize) -> ChannelMode {
        match self {
            Self::Latest => ChannelMode::Latest,
            Self::Fifo => ChannelMode::Fifo { capacity },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
