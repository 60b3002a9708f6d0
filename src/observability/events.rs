//! Structured event stream for `greenlight`.
//!
//! Discrete, typed events emitted while a signal runs. Events are
//! serialized as newline-delimited JSON (JSONL) and carry a monotonically
//! increasing sequence number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::phase::{Phase, PhaseTransition};

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during a signal run.
///
/// Tagged with `"type"` when serialized so consumers can dispatch on kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The cycling task has started.
    SignalStarted {
        /// When cycling started.
        timestamp: DateTime<Utc>,
        /// Configured signal name.
        signal: String,
        /// Phase shown before the first flip.
        initial_phase: Phase,
        /// Drawn phase duration in milliseconds.
        phase_duration_ms: u64,
    },

    /// The signal flipped.
    PhaseChanged {
        /// When the flip was observed.
        timestamp: DateTime<Utc>,
        /// Phase before the flip.
        from: Phase,
        /// Phase after the flip.
        to: Phase,
        /// 1-based transition number.
        transition: u64,
        /// How long the previous phase lasted, in milliseconds.
        elapsed_ms: u64,
    },

    /// An observer blocked in `wait_for_green` was released.
    ObserverReleased {
        /// When the observer returned.
        timestamp: DateTime<Utc>,
        /// Observer index.
        observer: usize,
        /// Time spent blocked, in milliseconds.
        waited_ms: u64,
    },

    /// The signal has stopped.
    SignalStopped {
        /// When the signal stopped.
        timestamp: DateTime<Utc>,
        /// Human-readable stop reason.
        reason: String,
        /// Number of flips performed.
        transitions: u64,
    },
}

impl Event {
    /// Builds a `PhaseChanged` event from a transition record.
    #[must_use]
    pub fn phase_changed(transition: &PhaseTransition) -> Self {
        Self::PhaseChanged {
            timestamp: Utc::now(),
            from: transition.from,
            to: transition.to,
            transition: transition.sequence,
            elapsed_ms: u64::try_from(transition.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) increments the sequence counter,
/// serializes the event as a single JSON line, and flushes. Serialization
/// or I/O failures are ignored.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        // Numbered under the writer lock so lines appear in sequence order.
        let mut w = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let envelope = EventEnvelope {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            event,
        };

        if let Ok(line) = serde_json::to_string(&envelope) {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
