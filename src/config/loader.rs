//! Configuration loader
//!
//! Loading pipeline:
//! 1. Size check
//! 2. Environment variable expansion (`${VAR}`, `${VAR:-default}`) on raw text
//! 3. YAML parsing into typed config
//! 4. Validation
//! 5. Freeze with `Arc`

use std::path::Path;
use std::sync::Arc;

use crate::config::schema::GreenlightConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Options for the configuration loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Maximum configuration file size in bytes.
    pub max_config_size: u64,

    /// Treat validation warnings as errors.
    pub strict: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_config_size: env_or("GREENLIGHT_MAX_CONFIG_SIZE", 64 * 1024),
            strict: false,
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<GreenlightConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Loads, validates, and freezes the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file is missing, too large, fails to
    /// parse, references an unset environment variable, or fails
    /// validation.
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        if metadata.len() > self.options.max_config_size {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.options.max_config_size,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            line: None,
            message: e.to_string(),
        })?;

        tracing::debug!(path = %path.display(), bytes = raw.len(), "loading configuration");
        self.load_str(&raw, path)
    }

    /// Runs the pipeline on already-read text; `path` is used for messages.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_str(&self, raw: &str, path: &Path) -> Result<LoadResult, ConfigError> {
        let expanded = expand_env_vars(raw)?;

        let config: GreenlightConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        let result = Validator::new().validate(&config);
        let mut errors = result.errors;
        if self.options.strict {
            errors.extend(result.warnings.iter().cloned());
        }
        if !errors.is_empty() {
            return Err(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors,
            });
        }

        let warnings = result
            .warnings
            .into_iter()
            .map(|issue| LoadWarning {
                message: issue.message,
                location: Some(issue.path),
            })
            .collect();

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expands `${VAR}` and `${VAR:-default}` references; `$$` escapes `$`.
///
/// # Errors
///
/// Returns `ConfigError::EnvVarNotSet` for a reference without a default
/// whose variable is unset, and `ConfigError::InvalidValue` for an
/// unterminated `${`.
pub fn expand_env_vars(raw: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('$') {
            out.push('$');
            rest = after;
        } else if let Some(body) = tail.strip_prefix('{') {
            let end = body.find('}').ok_or_else(|| ConfigError::InvalidValue {
                field: "${...}".to_owned(),
                value: rest.lines().next().unwrap_or_default().to_owned(),
                expected: "a closing '}'".to_owned(),
            })?;
            let reference = &body[..end];
            let (name, default) = match reference.split_once(":-") {
                Some((n, d)) => (n, Some(d)),
                None => (reference, None),
            };
            match (std::env::var(name), default) {
                (Ok(value), _) => out.push_str(&value),
                (Err(_), Some(d)) => out.push_str(d),
                (Err(_), None) => {
                    return Err(ConfigError::EnvVarNotSet {
                        var: name.to_owned(),
                        location: format!("line {}", line_of(raw, raw.len() - rest.len() + pos)),
                    });
                }
            }
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = tail;
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
