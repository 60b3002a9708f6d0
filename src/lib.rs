//! `greenlight` - a simulated traffic signal with blocking phase waiters
//!
//! A background task flips a two-phase (red/green) signal after randomized
//! durations. Callers can read the current phase without blocking or block
//! in [`SignalController::wait_for_green`](phase::SignalController::wait_for_green)
//! until the signal turns green. Phase changes travel through a
//! condition-variable channel ([`PhaseChannel`](phase::PhaseChannel)), so
//! waiters sleep instead of polling.

pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod phase;
