//! Signal phase representation
//!
//! Atomic state for the current phase and the transition counter, plus
//! the phase entry time. Written by the cycling task, read by anyone.

use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The two-valued state of a traffic signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Traffic must stop.
    #[default]
    Red,
    /// Traffic may proceed.
    Green,
}

impl Phase {
    /// Every phase, in cycle order.
    pub const ALL: [Self; 2] = [Self::Red, Self::Green];

    /// Returns the phase that follows this one.
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Red => Self::Green,
            Self::Green => Self::Red,
        }
    }

    /// Lowercase name, as used in config files and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
        }
    }

    const fn to_bits(self) -> u8 {
        match self {
            Self::Red => 0,
            Self::Green => 1,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        if bits == 0 { Self::Red } else { Self::Green }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        if let Some(phase) = Self::ALL.into_iter().find(|p| p.as_str() == needle) {
            return Ok(phase);
        }

        let suggestion = Self::ALL
            .into_iter()
            .map(|p| (p, strsim::jaro_winkler(&needle, p.as_str())))
            .filter(|(_, score)| *score > 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or_else(String::new, |(p, _)| format!(" (did you mean '{p}'?)"));

        Err(ConfigError::InvalidValue {
            field: "phase".to_owned(),
            value: s.to_owned(),
            expected: format!("'red' or 'green'{suggestion}"),
        })
    }
}

/// Record of a single phase flip published by the cycling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Phase we flipped from
    pub from: Phase,
    /// Phase we flipped to
    pub to: Phase,
    /// 1-based transition number since the controller started
    pub sequence: u64,
    /// How long the previous phase lasted
    pub elapsed: Duration,
}

/// Atomic phase cell.
///
/// The phase is stored as an `AtomicU8` so readers never observe a torn
/// write. Only the cycling task calls [`advance`](Self::advance).
pub struct PhaseCell {
    current: AtomicU8,
    transitions: AtomicU64,
    entered_at: Mutex<Instant>,
}

impl PhaseCell {
    /// Creates a cell holding `initial`.
    #[must_use]
    pub fn new(initial: Phase) -> Self {
        Self {
            current: AtomicU8::new(initial.to_bits()),
            transitions: AtomicU64::new(0),
            entered_at: Mutex::new(Instant::now()),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn load(&self) -> Phase {
        Phase::from_bits(self.current.load(Ordering::Acquire))
    }

    /// Returns how many flips have happened.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Acquire)
    }

    /// Returns the instant the current phase was entered.
    #[must_use]
    pub fn entered_at(&self) -> Instant {
        *self.entered_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restarts the clock for the current phase.
    pub fn reset_clock(&self) {
        let mut entered = self.entered_at.lock().unwrap_or_else(PoisonError::into_inner);
        *entered = Instant::now();
    }

    /// Flips the phase and returns the resulting transition record.
    pub fn advance(&self) -> PhaseTransition {
        let now = Instant::now();
        let mut entered = self.entered_at.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(*entered);
        *entered = now;
        drop(entered);

        let from = self.load();
        let to = from.toggle();
        self.current.store(to.to_bits(), Ordering::Release);
        let sequence = self.transitions.fetch_add(1, Ordering::AcqRel) + 1;

        PhaseTransition {
            from,
            to,
            sequence,
            elapsed,
        }
    }
}

impl std::fmt::Debug for PhaseCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseCell")
            .field("current", &self.load())
            .field("transitions", &self.transitions())
            .finish_non_exhaustive()
    }
}
