//! Shared integration-test harness for driving the `greenlight` binary and
//! building fast-cycling controllers.

#![allow(dead_code)]

use std::process::{Command, Output};
use std::time::Duration;

use greenlight::phase::{ChannelMode, PhaseTiming, RedrawPolicy, SignalOptions};
use serde_json::Value;

/// Generous upper bound for any single blocking call in tests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the binary with `args` to completion.
#[allow(clippy::missing_panics_doc)]
pub fn run_greenlight(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_greenlight"))
        .args(args)
        .env_remove("GREENLIGHT_CONFIG")
        .env_remove("GREENLIGHT_LOG_LEVEL")
        .output()
        .expect("failed to spawn greenlight")
}

/// Parses every non-empty stdout line as JSON.
#[allow(clippy::missing_panics_doc)]
pub fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l).unwrap_or_else(|e| panic!("invalid JSON line: {e}\n{l}"))
        })
        .collect()
}

/// Controller options with millisecond-scale phases.
pub fn fast_options(min_ms: u64, max_ms: u64) -> SignalOptions {
    SignalOptions {
        name: "test".to_owned(),
        timing: PhaseTiming {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
            poll_interval: Duration::from_millis(1),
            redraw: RedrawPolicy::PerRun,
        },
        feed: ChannelMode::Fifo { capacity: 256 },
        seed: Some(7),
        ..SignalOptions::default()
    }
}
