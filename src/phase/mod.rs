//! Signal phase machinery
//!
//! A two-state (red/green) signal whose phase is flipped by a background
//! cycling thread and delivered to blocked callers through a condition-based
//! channel.
//!
//! # Architecture
//!
//! - [`Phase`] / [`PhaseCell`]: the phase value and its atomic holder
//! - [`PhaseChannel`]: `Mutex` + `Condvar` channel with blocking receive
//! - [`PhaseTimer`]: randomized phase durations and flip scheduling
//! - [`SignalController`]: owns the cycling thread, fans transitions out
//!   to waiters, and exposes `simulate` / `current_phase` / `wait_for_green`

pub mod channel;
pub mod controller;
pub mod state;
pub mod timing;

pub use channel::{ChannelMode, ChannelStats, PhaseChannel};
pub use controller::{SignalController, SignalOptions};
pub use state::{Phase, PhaseCell, PhaseTransition};
pub use timing::{PhaseTimer, PhaseTiming, RedrawPolicy};
