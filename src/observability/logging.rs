//! `tracing` subscriber setup.
//!
//! Everything is written to stderr so that stdout stays free for the
//! JSONL event stream of `greenlight run`.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Overrides `-v`/`-q` when set, using `EnvFilter` directive syntax
/// (`greenlight=debug,warn`).
pub const LOG_LEVEL_ENV: &str = "GREENLIGHT_LOG_LEVEL";

/// Verbosity at which the cycling and observer thread names appear.
const THREAD_NAMES_AT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// One line per record, coloured when the terminal allows it
    #[default]
    Human,
    /// One JSON object per record
    Json,
}

/// Level directive for a `-v` count. Counts past three stay at `trace`.
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn build_filter(verbosity: u8) -> EnvFilter {
    match EnvFilter::try_from_env(LOG_LEVEL_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(verbosity_to_directive(verbosity)),
    }
}

/// `Auto` honours `NO_COLOR` and only colours an interactive stderr.
fn ansi_enabled(color: ColorChoice) -> bool {
    match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => {
            std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal()
        }
    }
}

/// Installs the global subscriber.
///
/// A second call is a no-op: the subscriber installed first wins.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter = build_filter(verbosity);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Json => builder.json().with_thread_names(true).try_init(),
        LogFormat::Human => {
            let detailed = verbosity >= THREAD_NAMES_AT;
            builder
                .with_ansi(ansi_enabled(color))
                .with_target(detailed)
                .with_thread_names(detailed)
                .try_init()
        }
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
