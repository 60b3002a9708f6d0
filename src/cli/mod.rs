//! Command-line interface
//!
//! Argument definitions and command handlers for the `greenlight` binary.

pub mod args;
pub mod commands;
