//! Configuration validation
//!
//! Semantic checks on a deserialized `GreenlightConfig`. Validation
//! collects ALL issues rather than stopping at the first.

use std::time::Duration;

use crate::config::schema::{GreenlightConfig, SignalConfig};
use crate::error::{Severity, ValidationIssue};
use crate::phase::ChannelMode;

/// Longest accepted signal name.
const MAX_NAME_LEN: usize = 64;

/// Largest accepted transition-feed queue.
pub const MAX_FIFO_CAPACITY: usize = 65_536;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &GreenlightConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_signal(&config.signal);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_signal(&mut self, signal: &SignalConfig) {
        if signal.name.trim().is_empty() {
            self.add_error("signal.name", "signal name is required and cannot be empty");
        } else if signal.name.len() > MAX_NAME_LEN {
            self.add_warning(
                "signal.name",
                &format!("signal name is unusually long (> {MAX_NAME_LEN} characters)"),
            );
        }

        let range = signal.phase_duration;
        if range.min.is_zero() {
            self.add_error("signal.phase_duration.min", "must be greater than zero");
        }
        if range.max.is_zero() {
            self.add_error("signal.phase_duration.max", "must be greater than zero");
        }
        if range.min > range.max {
            self.add_error(
                "signal.phase_duration",
                &format!(
                    "min ({}) is greater than max ({})",
                    humantime::format_duration(range.min),
                    humantime::format_duration(range.max)
                ),
            );
        }
        if range.min.subsec_nanos() % 1_000_000 != 0 || range.max.subsec_nanos() % 1_000_000 != 0
        {
            self.add_warning(
                "signal.phase_duration",
                "bounds are drawn at millisecond resolution; sub-millisecond parts are ignored",
            );
        }

        self.validate_poll_interval(signal.poll_interval, range.min);

        if let ChannelMode::Fifo { capacity } = signal.channel {
            if capacity == 0 {
                self.add_error("signal.channel.capacity", "capacity must be at least 1");
            } else if capacity > MAX_FIFO_CAPACITY {
                self.add_error(
                    "signal.channel.capacity",
                    &format!("capacity must be at most {MAX_FIFO_CAPACITY}"),
                );
            }
        }
    }

    fn validate_poll_interval(&mut self, poll: Duration, min_phase: Duration) {
        if poll.is_zero() {
            self.add_error("signal.poll_interval", "must be greater than zero");
            return;
        }
        if !min_phase.is_zero() && poll >= min_phase {
            self.add_error(
                "signal.poll_interval",
                "must be shorter than the minimum phase duration",
            );
        } else if poll > min_phase / 10 {
            self.add_warning(
                "signal.poll_interval",
                "coarser than a tenth of the minimum phase; flips will be noticeably late",
            );
        }
    }

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_owned(),
            message: message.to_owned(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_owned(),
            message: message.to_owned(),
            severity: Severity::Warning,
        });
    }
}
