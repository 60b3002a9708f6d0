//! Configuration module
//!
//! Loading and validation of `greenlight` YAML configuration files.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::{DurationRange, GreenlightConfig, SignalConfig};
pub use validation::{ValidationResult, Validator};
