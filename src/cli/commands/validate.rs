//! `validate` command
//!
//! Loads each configuration file through the full pipeline and reports the
//! outcome without starting a signal.

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::loader::{ConfigLoader, LoaderOptions};
use crate::error::GreenlightError;

/// Validate configuration files.
///
/// Every file is checked; the first failure is returned after all files
/// have been reported.
///
/// # Errors
///
/// Returns a config error if any file fails to load or validate.
pub fn run(args: &ValidateArgs) -> Result<(), GreenlightError> {
    let loader = ConfigLoader::new(LoaderOptions {
        strict: args.strict,
        ..LoaderOptions::default()
    });
    let mut first_error = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");

        match loader.load(path) {
            Ok(result) => {
                for warning in &result.warnings {
                    tracing::warn!(
                        location = warning.location.as_deref().unwrap_or("<unknown>"),
                        "{}",
                        warning.message
                    );
                }
                match args.format {
                    OutputFormat::Human => println!("{}: ok", path.display()),
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({
                            "file": path.display().to_string(),
                            "valid": true,
                            "signal": result.config.signal.name,
                            "warnings": result
                                .warnings
                                .iter()
                                .map(|w| w.message.as_str())
                                .collect::<Vec<_>>(),
                        })
                    ),
                }
            }
            Err(e) => {
                match args.format {
                    OutputFormat::Human => println!("{}: invalid", path.display()),
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({
                            "file": path.display().to_string(),
                            "valid": false,
                            "error": e.to_string(),
                        })
                    ),
                }
                first_error.get_or_insert(e);
            }
        }
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}
