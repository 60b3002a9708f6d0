//! Phase timing
//!
//! Draws randomized phase durations and tracks when the next flip is due.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default lower bound of a phase duration.
pub const DEFAULT_MIN_PHASE: Duration = Duration::from_millis(4000);

/// Default upper bound of a phase duration.
pub const DEFAULT_MAX_PHASE: Duration = Duration::from_millis(6000);

/// Default sleep between timer checks in the cycling loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// When the cycling task draws a new phase duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedrawPolicy {
    /// Draw once when the task starts; every phase lasts the same time.
    #[default]
    PerRun,
    /// Draw again after every flip.
    PerCycle,
}

/// Timing parameters for the cycling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    /// Shortest phase duration
    pub min: Duration,
    /// Longest phase duration
    pub max: Duration,
    /// Sleep between timer checks
    pub poll_interval: Duration,
    /// When to draw a new duration
    pub redraw: RedrawPolicy,
}

impl Default for PhaseTiming {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PHASE,
            max: DEFAULT_MAX_PHASE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            redraw: RedrawPolicy::PerRun,
        }
    }
}

/// Draws a duration uniformly from `[min, max]` at millisecond resolution.
///
/// The bounds may be given in either order.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_duration<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let a = min.as_millis() as u64;
    let b = max.as_millis() as u64;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rng.random_range(lo..=hi))
}

/// Stopwatch deciding when the current phase has run its course.
#[derive(Debug)]
pub struct PhaseTimer<R> {
    timing: PhaseTiming,
    rng: R,
    duration: Duration,
    reference: Instant,
}

impl<R: Rng> PhaseTimer<R> {
    /// Starts the stopwatch now with a freshly drawn duration.
    pub fn start(timing: PhaseTiming, mut rng: R) -> Self {
        let duration = draw_duration(&mut rng, timing.min, timing.max);
        Self {
            timing,
            rng,
            duration,
            reference: Instant::now(),
        }
    }

    /// Duration of the phase currently being timed.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Time elapsed since the reference point at `now`.
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.reference)
    }

    /// Returns `true` once the current phase has lasted its full duration.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.duration
    }

    /// Resets the reference point to `now`, redrawing the duration under
    /// [`RedrawPolicy::PerCycle`].
    pub fn restart(&mut self, now: Instant) {
        self.reference = now;
        if self.timing.redraw == RedrawPolicy::PerCycle {
            self.duration = draw_duration(&mut self.rng, self.timing.min, self.timing.max);
        }
    }

    /// Sleep between checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.timing.poll_interval
    }
}
