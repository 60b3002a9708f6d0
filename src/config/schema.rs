//! Configuration schema
//!
//! Serde types for `greenlight` YAML configuration files. Durations are
//! written as `humantime` strings (`"4s"`, `"1500ms"`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::phase::timing::{DEFAULT_MAX_PHASE, DEFAULT_MIN_PHASE, DEFAULT_POLL_INTERVAL};
use crate::phase::{ChannelMode, Phase, PhaseTiming, RedrawPolicy, SignalOptions};

/// Root of a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GreenlightConfig {
    /// The signal to run.
    #[serde(default)]
    pub signal: SignalConfig,
}

/// Settings for a single signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalConfig {
    /// Name used in logs, metrics, and events.
    #[serde(default = "default_name")]
    pub name: String,

    /// Phase shown before the first flip.
    #[serde(default)]
    pub initial_phase: Phase,

    /// Bounds for the randomized phase duration.
    #[serde(default)]
    pub phase_duration: DurationRange,

    /// When a new duration is drawn.
    #[serde(default)]
    pub redraw: RedrawPolicy,

    /// Sleep between timer checks in the cycling loop.
    #[serde(default = "default_poll_interval", with = "humantime_duration")]
    pub poll_interval: Duration,

    /// Buffering mode of the transition feed.
    #[serde(default)]
    pub channel: ChannelMode,

    /// Fixed RNG seed for reproducible runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            initial_phase: Phase::Red,
            phase_duration: DurationRange::default(),
            redraw: RedrawPolicy::PerRun,
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel: ChannelMode::Latest,
            seed: None,
        }
    }
}

impl SignalConfig {
    /// Converts the file settings into controller options.
    #[must_use]
    pub fn to_options(&self) -> SignalOptions {
        SignalOptions {
            name: self.name.clone(),
            initial_phase: self.initial_phase,
            timing: PhaseTiming {
                min: self.phase_duration.min,
                max: self.phase_duration.max,
                poll_interval: self.poll_interval,
                redraw: self.redraw,
            },
            feed: self.channel,
            seed: self.seed,
        }
    }
}

/// Inclusive duration bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DurationRange {
    /// Lower bound.
    #[serde(with = "humantime_duration")]
    pub min: Duration,
    /// Upper bound.
    #[serde(with = "humantime_duration")]
    pub max: Duration,
}

impl Default for DurationRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PHASE,
            max: DEFAULT_MAX_PHASE,
        }
    }
}

fn default_name() -> String {
    "signal".to_owned()
}

const fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

/// Serde adapter for `humantime` duration strings.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim())
            .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
    }
}
