//! Error types for `greenlight`
//!
//! One enum per subsystem (channel, signal controller, configuration),
//! aggregated by [`GreenlightError`] which also maps each failure to a
//! process exit code.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::phase::Phase;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `greenlight` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Signal controller error (double start, stopped while waiting)
    pub const SIGNAL_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `greenlight` operations.
#[derive(Debug, Error)]
pub enum GreenlightError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Signal controller error
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GreenlightError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Signal(_) => ExitCode::SIGNAL_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Channel Errors
// ============================================================================

/// Failure modes of a blocking receive on a [`PhaseChannel`].
///
/// [`PhaseChannel`]: crate::phase::PhaseChannel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel was closed and holds no more values
    #[error("channel closed")]
    Closed,

    /// The receive deadline passed with nothing buffered
    #[error("receive timed out")]
    Timeout,
}

// ============================================================================
// Signal Errors
// ============================================================================

/// Signal controller errors.
#[derive(Debug, Error)]
pub enum SignalError {
    /// `simulate()` was called on a controller that is already cycling
    #[error("signal '{0}' is already cycling")]
    AlreadyStarted(String),

    /// The controller was shut down while a caller was waiting
    #[error("signal '{0}' stopped")]
    Stopped(String),

    /// The awaited phase was not observed before the deadline
    #[error("no {phase} phase observed within {}", format_wait(.after))]
    WaitTimedOut {
        /// Phase the caller was waiting for
        phase: Phase,
        /// How long the caller waited
        after: Duration,
    },

    /// No transition arrived on the feed before the deadline
    #[error("no phase transition within {}", format_wait(.0))]
    TransitionTimedOut(Duration),

    /// The cycling thread could not be spawned
    #[error("failed to spawn cycling task: {0}")]
    Spawn(#[source] std::io::Error),
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", format_issues(.errors))]
    ValidationError {
        /// Path to the configuration file (or `<cli>` for flag overrides)
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Configuration file exceeds the size limit
    #[error("{path} is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Path to the configuration file
        path: PathBuf,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

fn format_wait(wait: &Duration) -> String {
    humantime::format_duration(*wait).to_string()
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "signal.phase_duration.min")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_per_variant() {
        let config: GreenlightError = ConfigError::MissingFile {
            path: PathBuf::from("signal.yaml"),
        }
        .into();
        assert_eq!(config.exit_code(), ExitCode::CONFIG_ERROR);

        let signal: GreenlightError = SignalError::Stopped("main".to_owned()).into();
        assert_eq!(signal.exit_code(), ExitCode::SIGNAL_ERROR);

        let io: GreenlightError = std::io::Error::other("boom").into();
        assert_eq!(io.exit_code(), ExitCode::IO_ERROR);

        let usage = GreenlightError::Usage("--cycles must be at least 1".to_owned());
        assert_eq!(usage.exit_code(), ExitCode::USAGE_ERROR);
    }

    #[test]
    fn validation_issue_display() {
        let issue = ValidationIssue {
            path: "signal.poll_interval".to_owned(),
            message: "must be greater than zero".to_owned(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: must be greater than zero at signal.poll_interval"
        );
    }

    #[test]
    fn validation_error_lists_issues() {
        let err = ConfigError::ValidationError {
            path: "signal.yaml".to_owned(),
            errors: vec![
                ValidationIssue {
                    path: "signal.name".to_owned(),
                    message: "name is required".to_owned(),
                    severity: Severity::Error,
                },
                ValidationIssue {
                    path: "signal.channel.capacity".to_owned(),
                    message: "capacity must be at least 1".to_owned(),
                    severity: Severity::Error,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("signal.name"));
        assert!(msg.contains("signal.channel.capacity"));
    }

    #[test]
    fn wait_timeout_names_the_awaited_phase() {
        let green = SignalError::WaitTimedOut {
            phase: Phase::Green,
            after: Duration::from_millis(1500),
        };
        assert_eq!(green.to_string(), "no green phase observed within 1s 500ms");

        let red = SignalError::WaitTimedOut {
            phase: Phase::Red,
            after: Duration::from_secs(2),
        };
        assert_eq!(red.to_string(), "no red phase observed within 2s");
    }

    #[test]
    fn transition_timeout_formats_duration() {
        let err = SignalError::TransitionTimedOut(Duration::from_millis(250));
        assert_eq!(err.to_string(), "no phase transition within 250ms");
    }
}
