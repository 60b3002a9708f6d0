//! Signal controller
//!
//! The `SignalController` owns the current phase and the cycling task that
//! flips it. Each flip is published to:
//!
//! - the controller's transition feed (a single [`PhaseChannel`] drained by
//!   [`SignalController::next_transition`]), and
//! - one `Latest`-mode channel per active waiter, so every concurrent
//!   [`wait_for_green`](SignalController::wait_for_green) caller sees every
//!   green.
//!
//! Waiter channels are registered and published to under the same lock,
//! and a new waiter's channel is seeded with the phase current at
//! registration. A flip can therefore never fall between a waiter's
//! snapshot and its registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{ChannelError, SignalError};
use crate::observability::metrics;

use super::channel::{ChannelMode, ChannelStats, PhaseChannel};
use super::state::{Phase, PhaseCell, PhaseTransition};
use super::timing::{PhaseTimer, PhaseTiming};

/// Name given to the cycling thread.
pub const CYCLE_THREAD_NAME: &str = "greenlight-cycle";

/// Construction parameters for a [`SignalController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalOptions {
    /// Signal name, used in logs, metrics and errors
    pub name: String,
    /// Phase the signal shows before the first flip
    pub initial_phase: Phase,
    /// Phase duration bounds, poll interval and redraw policy
    pub timing: PhaseTiming,
    /// Buffering mode of the transition feed
    pub feed: ChannelMode,
    /// Fixed RNG seed for reproducible durations
    pub seed: Option<u64>,
}

impl Default for SignalOptions {
    fn default() -> Self {
        Self {
            name: "signal".to_owned(),
            initial_phase: Phase::Red,
            timing: PhaseTiming::default(),
            feed: ChannelMode::Latest,
            seed: None,
        }
    }
}

#[derive(Debug, Default)]
struct Waiters {
    next_id: u64,
    channels: HashMap<u64, Arc<PhaseChannel<Phase>>>,
}

/// State shared between the controller handle and the cycling thread.
#[derive(Debug)]
struct Shared {
    name: String,
    phase: PhaseCell,
    feed: PhaseChannel<PhaseTransition>,
    waiters: Mutex<Waiters>,
    /// Duration of the phase being timed, in ms (0 before the first draw)
    phase_duration_ms: AtomicU64,
    stopped: AtomicBool,
}

impl Shared {
    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flips the phase and fans the new value out to every channel.
    fn publish(&self) -> PhaseTransition {
        let waiters = self.waiters();
        let transition = self.phase.advance();
        for channel in waiters.channels.values() {
            channel.send(transition.to);
        }
        drop(waiters);

        let overwritten_before = self.feed.stats().overwritten;
        self.feed.send(transition);
        let overwritten = self.feed.stats().overwritten - overwritten_before;
        if overwritten > 0 {
            metrics::record_channel_overwrites(overwritten);
        }

        metrics::record_phase_transition(transition.from.as_str(), transition.to.as_str());
        metrics::set_current_phase(transition.to, Some(transition.from));
        metrics::record_phase_duration(transition.elapsed);

        info!(
            signal = %self.name,
            from = %transition.from,
            to = %transition.to,
            sequence = transition.sequence,
            elapsed_ms = u64::try_from(transition.elapsed.as_millis()).unwrap_or(u64::MAX),
            "phase transition"
        );
        transition
    }

    fn set_phase_duration(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.phase_duration_ms.store(ms, Ordering::Release);
    }
}

/// Registration of one waiter's channel; unregisters on drop.
struct Subscription {
    id: u64,
    channel: Arc<PhaseChannel<Phase>>,
    shared: Arc<Shared>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut waiters = self.shared.waiters();
        waiters.channels.remove(&self.id);
        let active = waiters.channels.len();
        drop(waiters);
        metrics::set_waiters_active(active);
        trace!(signal = %self.shared.name, waiter = self.id, "waiter unregistered");
    }
}

/// A traffic signal cycling between red and green on a background thread.
///
/// Lifecycle: [`new`](Self::new) → [`simulate`](Self::simulate) (once) →
/// [`shutdown`](Self::shutdown) (or drop).
pub struct SignalController {
    options: SignalOptions,
    shared: Arc<Shared>,
    started: AtomicBool,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SignalController {
    /// Creates a stopped signal showing `options.initial_phase`.
    #[must_use]
    pub fn new(options: SignalOptions) -> Self {
        let shared = Arc::new(Shared {
            name: options.name.clone(),
            phase: PhaseCell::new(options.initial_phase),
            feed: PhaseChannel::new(options.feed),
            waiters: Mutex::new(Waiters::default()),
            phase_duration_ms: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        });
        metrics::set_current_phase(options.initial_phase, None);

        Self {
            options,
            shared,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Signal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Options this controller was built with.
    #[must_use]
    pub const fn options(&self) -> &SignalOptions {
        &self.options
    }

    /// Starts the cycling task.
    ///
    /// # Errors
    ///
    /// - [`SignalError::AlreadyStarted`] on any call after the first; the
    ///   running task is left untouched.
    /// - [`SignalError::Stopped`] if the controller was shut down.
    /// - [`SignalError::Spawn`] if the OS refused to create the thread.
    pub fn simulate(&self) -> Result<(), SignalError> {
        // Held across check and spawn so `shutdown` cannot miss the handle.
        let mut worker = self.worker();
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(SignalError::Stopped(self.options.name.clone()));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            warn!(signal = %self.options.name, "simulate() called twice; ignoring");
            return Err(SignalError::AlreadyStarted(self.options.name.clone()));
        }

        let rng = self
            .options
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        self.shared.phase.reset_clock();
        let timer = PhaseTimer::start(self.options.timing, rng);
        self.shared.set_phase_duration(timer.duration());

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let handle = thread::Builder::new()
            .name(CYCLE_THREAD_NAME.to_owned())
            .spawn(move || cycle(&shared, timer, &cancel))
            .map_err(|e| {
                self.started.store(false, Ordering::Release);
                SignalError::Spawn(e)
            })?;
        *worker = Some(handle);
        drop(worker);

        info!(
            signal = %self.options.name,
            initial_phase = %self.options.initial_phase,
            phase_duration_ms = self.shared.phase_duration_ms.load(Ordering::Acquire),
            redraw = ?self.options.timing.redraw,
            "signal cycling started"
        );
        Ok(())
    }

    /// Returns the latest published phase without blocking.
    ///
    /// May trail an in-flight transition by a moment; use
    /// [`wait_for_green`](Self::wait_for_green) or
    /// [`next_transition`](Self::next_transition) for authoritative events.
    #[must_use]
    pub fn current_phase(&self) -> Phase {
        self.shared.phase.load()
    }

    /// Blocks until the signal shows green.
    ///
    /// Red events are discarded. Returns immediately if the signal is
    /// already green when called.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Stopped`] if the controller is shut down
    /// first.
    pub fn wait_for_green(&self) -> Result<(), SignalError> {
        self.wait_for_phase(Phase::Green, None)
    }

    /// Like [`wait_for_green`](Self::wait_for_green) with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::WaitTimedOut`] if no green was observed in
    /// time, or [`SignalError::Stopped`] on shutdown.
    pub fn wait_for_green_timeout(&self, timeout: Duration) -> Result<(), SignalError> {
        self.wait_for_phase(Phase::Green, Some(timeout))
    }

    /// Blocks until the signal shows `target`, optionally bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::WaitTimedOut`] if the deadline passes, or
    /// [`SignalError::Stopped`] if the controller is shut down.
    pub fn wait_for_phase(&self, target: Phase, timeout: Option<Duration>) -> Result<(), SignalError> {
        let subscription = self.subscribe()?;
        // A deadline `Instant` cannot represent is treated as no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let started = Instant::now();

        loop {
            let received = match deadline {
                None => subscription.channel.receive(),
                Some(d) => subscription
                    .channel
                    .receive_timeout(d.saturating_duration_since(Instant::now())),
            };
            match received {
                Ok(phase) if phase == target => {
                    metrics::record_wait_duration(started.elapsed());
                    debug!(
                        signal = %self.options.name,
                        waiter = subscription.id,
                        phase = %phase,
                        "waiter released"
                    );
                    return Ok(());
                }
                Ok(phase) => {
                    trace!(waiter = subscription.id, phase = %phase, "discarding phase event");
                }
                Err(ChannelError::Closed) => {
                    return Err(SignalError::Stopped(self.options.name.clone()));
                }
                Err(ChannelError::Timeout) => {
                    metrics::record_error("wait_timeout");
                    return Err(SignalError::WaitTimedOut {
                        phase: target,
                        after: timeout.unwrap_or_default(),
                    });
                }
            }
        }
    }

    /// Blocks until the next transition is available on the feed.
    ///
    /// The feed is meant for a single consumer; concurrent callers split
    /// the transitions between them.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Stopped`] once the controller is shut down and
    /// the feed is drained.
    pub fn next_transition(&self) -> Result<PhaseTransition, SignalError> {
        self.shared
            .feed
            .receive()
            .map_err(|_| SignalError::Stopped(self.options.name.clone()))
    }

    /// Like [`next_transition`](Self::next_transition) with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::TransitionTimedOut`] or [`SignalError::Stopped`].
    pub fn next_transition_timeout(&self, timeout: Duration) -> Result<PhaseTransition, SignalError> {
        self.shared.feed.receive_timeout(timeout).map_err(|e| match e {
            ChannelError::Timeout => SignalError::TransitionTimedOut(timeout),
            ChannelError::Closed => SignalError::Stopped(self.options.name.clone()),
        })
    }

    /// Takes a buffered transition from the feed without blocking.
    #[must_use]
    pub fn try_next_transition(&self) -> Option<PhaseTransition> {
        self.shared.feed.try_receive()
    }

    /// Number of flips so far.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.shared.phase.transitions()
    }

    /// Duration of the phase currently being timed, once cycling started.
    ///
    /// Under [`RedrawPolicy::PerRun`](super::timing::RedrawPolicy::PerRun)
    /// this stays the same for the life of the task.
    #[must_use]
    pub fn phase_duration(&self) -> Option<Duration> {
        match self.shared.phase_duration_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Returns `true` between a successful `simulate()` and shutdown.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.shared.stopped.load(Ordering::Acquire)
    }

    /// Number of callers currently blocked in a wait.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.shared.waiters().channels.len()
    }

    /// Traffic counters of the transition feed.
    #[must_use]
    pub fn feed_stats(&self) -> ChannelStats {
        self.shared.feed.stats()
    }

    /// Stops the cycling task and releases every blocked caller.
    ///
    /// Cancels the task, closes all channels (waiters get
    /// [`SignalError::Stopped`]) and joins the thread. Idempotent; also run
    /// on drop.
    pub fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        let waiters = self.shared.waiters();
        for channel in waiters.channels.values() {
            channel.close();
        }
        drop(waiters);
        self.shared.feed.close();

        let handle = self.worker().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                metrics::record_error("cycle_panic");
                warn!(signal = %self.options.name, "cycling task panicked");
            }
        }

        info!(
            signal = %self.options.name,
            transitions = self.transition_count(),
            "signal stopped"
        );
    }

    fn subscribe(&self) -> Result<Subscription, SignalError> {
        let mut waiters = self.shared.waiters();
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(SignalError::Stopped(self.options.name.clone()));
        }

        let channel = Arc::new(PhaseChannel::new(ChannelMode::Latest));
        channel.send(self.shared.phase.load());

        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.channels.insert(id, Arc::clone(&channel));
        let active = waiters.channels.len();
        drop(waiters);

        metrics::set_waiters_active(active);
        trace!(signal = %self.options.name, waiter = id, "waiter registered");
        Ok(Subscription {
            id,
            channel,
            shared: Arc::clone(&self.shared),
        })
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SignalController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SignalController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalController")
            .field("name", &self.options.name)
            .field("current_phase", &self.current_phase())
            .field("transitions", &self.transition_count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Body of the cycling thread.
///
/// Checks the stopwatch every poll interval and flips the phase once the
/// drawn duration has elapsed. Exits when `cancel` fires.
fn cycle<R: Rng>(shared: &Shared, mut timer: PhaseTimer<R>, cancel: &CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            debug!(signal = %shared.name, "cycling task cancelled");
            break;
        }

        if timer.is_due(Instant::now()) {
            shared.publish();
            timer.restart(Instant::now());
            shared.set_phase_duration(timer.duration());
        }

        thread::sleep(timer.poll_interval());
    }
}
