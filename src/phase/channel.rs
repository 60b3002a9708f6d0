//! Blocking phase channel
//!
//! A `Mutex` + `Condvar` buffer connecting the cycling task to the tasks
//! waiting on it. `send` never blocks on consumers; `receive` parks the
//! caller (releasing the lock) until a value is buffered or the channel is
//! closed. There is no polling on the receive side: a parked receiver only
//! wakes when notified or spuriously, and the predicate is re-checked on
//! every wake.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Default buffer size for [`ChannelMode::Fifo`].
pub const DEFAULT_FIFO_CAPACITY: usize = 16;

const fn default_capacity() -> usize {
    DEFAULT_FIFO_CAPACITY
}

/// How a channel buffers values that have not been received yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChannelMode {
    /// Single slot. A send replaces any unconsumed value, so a receiver
    /// always gets the most recent phase and never a stale one.
    #[default]
    Latest,
    /// Bounded FIFO queue. When full, the oldest buffered value is dropped
    /// so the producer never blocks.
    Fifo {
        /// Maximum number of buffered values (at least 1).
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
}

impl ChannelMode {
    /// Maximum number of values the channel buffers.
    #[must_use]
    pub const fn capacity(self) -> usize {
        match self {
            Self::Latest => 1,
            Self::Fifo { capacity } => {
                if capacity == 0 {
                    1
                } else {
                    capacity
                }
            }
        }
    }

    /// Short name for logs and labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Fifo { .. } => "fifo",
        }
    }
}

/// Counters describing a channel's traffic so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Values accepted by `send`
    pub sent: u64,
    /// Values handed to receivers
    pub received: u64,
    /// Values displaced from the buffer before anyone received them
    pub overwritten: u64,
    /// Times a parked receiver returned from a condition wait
    pub wakeups: u64,
}

#[derive(Debug)]
struct Inner<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

/// Thread-safe, condition-based channel.
///
/// All access to the buffer happens under the mutex. The mutex guards only
/// plain collection operations, so a poisoned lock still holds consistent
/// state and is recovered rather than propagated.
pub struct PhaseChannel<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
    mode: ChannelMode,
    sent: AtomicU64,
    received: AtomicU64,
    overwritten: AtomicU64,
    wakeups: AtomicU64,
}

impl<T> PhaseChannel<T> {
    /// Creates an empty, open channel.
    #[must_use]
    pub fn new(mode: ChannelMode) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(mode.capacity().min(DEFAULT_FIFO_CAPACITY)),
                closed: false,
            }),
            ready: Condvar::new(),
            mode,
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
            wakeups: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffers `value` and wakes one parked receiver.
    ///
    /// Never blocks on consumers. Returns `false` (dropping the value) if
    /// the channel has been closed.
    pub fn send(&self, value: T) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }

        let displaced = match self.mode {
            ChannelMode::Latest => {
                let stale = inner.buffer.len();
                inner.buffer.clear();
                stale
            }
            ChannelMode::Fifo { .. } => {
                let mut dropped = 0;
                while inner.buffer.len() >= self.mode.capacity() {
                    inner.buffer.pop_front();
                    dropped += 1;
                }
                dropped
            }
        };
        inner.buffer.push_back(value);
        drop(inner);

        self.sent.fetch_add(1, Ordering::Relaxed);
        if displaced > 0 {
            self.overwritten
                .fetch_add(displaced as u64, Ordering::Relaxed);
        }
        self.ready.notify_one();
        true
    }

    /// Blocks until a value is available and removes it.
    ///
    /// Values still buffered when the channel is closed are delivered
    /// before [`ChannelError::Closed`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the channel is closed and
    /// drained.
    pub fn receive(&self) -> Result<T, ChannelError> {
        let mut inner = self.lock();
        loop {
            if let Some(value) = inner.buffer.pop_front() {
                drop(inner);
                self.received.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            if inner.closed {
                return Err(ChannelError::Closed);
            }
            inner = self
                .ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
            self.wakeups.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Like [`receive`](Self::receive), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Timeout`] if nothing arrived in time, or
    /// [`ChannelError::Closed`] if the channel is closed and drained.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<T, ChannelError> {
        // A deadline past what `Instant` can represent never expires.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.receive();
        };
        let mut inner = self.lock();
        loop {
            if let Some(value) = inner.buffer.pop_front() {
                drop(inner);
                self.received.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            if inner.closed {
                return Err(ChannelError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ChannelError::Timeout);
            }
            inner = self
                .ready
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            self.wakeups.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes a buffered value without blocking.
    pub fn try_receive(&self) -> Option<T> {
        let value = self.lock().buffer.pop_front();
        if value.is_some() {
            self.received.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Closes the channel and wakes every parked receiver.
    ///
    /// Later sends are rejected. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    /// The buffering mode this channel was created with.
    #[must_use]
    pub const fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Snapshot of the traffic counters.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for PhaseChannel<T> {
    fn default() -> Self {
        Self::new(ChannelMode::default())
    }
}

impl<T> std::fmt::Debug for PhaseChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseChannel")
            .field("mode", &self.mode)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use crate::phase::Phase;

    #[test]
    fn test_huge_fifo_capacity_does_not_preallocate() {
        let ch = PhaseChannel::new(ChannelMode::Fifo {
            capacity: usize::MAX,
        });
        for _ in 0..3 {
            ch.send(Phase::Red);
        }
        assert_eq!(ch.len(), 3);
        assert_eq!(ch.stats().overwritten, 0);
    }

    #[test]
    fn test_receive_timeout_max_duration() {
        let ch = PhaseChannel::new(ChannelMode::Latest);
        ch.send(Phase::Green);
        assert_eq!(ch.receive_timeout(Duration::MAX), Ok(Phase::Green));

        ch.close();
        assert_eq!(ch.receive_timeout(Duration::MAX), Err(ChannelError::Closed));
    }

    #[test]
    fn test_send_then_receive() {
        let ch = PhaseChannel::new(ChannelMode::Latest);
        assert!(ch.send(Phase::Green));
        assert_eq!(ch.receive(), Ok(Phase::Green));
        assert!(ch.is_empty());
    }

    #[test]
    fn test_latest_overwrites_unconsumed() {
        let ch = PhaseChannel::new(ChannelMode::Latest);
        ch.send(Phase::Green);
        ch.send(Phase::Red);
        ch.send(Phase::Green);

        assert_eq!(ch.len(), 1);
        assert_eq!(ch.try_receive(), Some(Phase::Green));
        assert_eq!(ch.try_receive(), None);

        let stats = ch.stats();
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.received, 1);
        assert_eq!(stats.overwritten, 2);
    }

    #[test]
    fn test_fifo_preserves_order() {
        let ch = PhaseChannel::new(ChannelMode::Fifo { capacity: 8 });
        for i in 0..5 {
            ch.send(i);
        }
        let got: Vec<i32> = (0..5).map(|_| ch.receive().unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_fifo_full_drops_oldest() {
        let ch = PhaseChannel::new(ChannelMode::Fifo { capacity: 2 });
        ch.send(1);
        ch.send(2);
        ch.send(3);

        assert_eq!(ch.len(), 2);
        assert_eq!(ch.try_receive(), Some(2));
        assert_eq!(ch.try_receive(), Some(3));
        assert_eq!(ch.stats().overwritten, 1);
    }

    #[test]
    fn test_zero_capacity_treated_as_one() {
        assert_eq!(ChannelMode::Fifo { capacity: 0 }.capacity(), 1);
        let ch = PhaseChannel::new(ChannelMode::Fifo { capacity: 0 });
        ch.send(1);
        ch.send(2);
        assert_eq!(ch.try_receive(), Some(2));
    }

    #[test]
    fn test_receive_blocks_until_send() {
        let ch = Arc::new(PhaseChannel::new(ChannelMode::Latest));
        let rx = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                let start = Instant::now();
                let phase = ch.receive().unwrap();
                (phase, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        ch.send(Phase::Green);

        let (phase, waited) = rx.join().unwrap();
        assert_eq!(phase, Phase::Green);
        assert!(waited >= Duration::from_millis(40), "returned early: {waited:?}");
    }

    #[test]
    fn test_parked_receiver_does_not_spin() {
        let ch = Arc::new(PhaseChannel::<Phase>::new(ChannelMode::Latest));
        let rx = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.receive())
        };

        thread::sleep(Duration::from_millis(300));
        // Nothing was sent; a polling receiver would have woken many times.
        assert!(ch.stats().wakeups <= 2, "stats: {:?}", ch.stats());

        ch.send(Phase::Red);
        assert_eq!(rx.join().unwrap(), Ok(Phase::Red));
    }

    #[test]
    fn test_receive_timeout_expires() {
        let ch = PhaseChannel::<Phase>::new(ChannelMode::Latest);
        let start = Instant::now();
        assert_eq!(
            ch.receive_timeout(Duration::from_millis(30)),
            Err(ChannelError::Timeout)
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_receive_timeout_returns_buffered() {
        let ch = PhaseChannel::new(ChannelMode::Latest);
        ch.send(Phase::Green);
        assert_eq!(ch.receive_timeout(Duration::ZERO), Ok(Phase::Green));
    }

    #[test]
    fn test_close_wakes_all_receivers() {
        let ch = Arc::new(PhaseChannel::<Phase>::new(ChannelMode::Latest));
        let receivers: Vec<_> = (0..4)
            .map(|_| {
                let ch = Arc::clone(&ch);
                thread::spawn(move || ch.receive())
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        ch.close();

        for r in receivers {
            assert_eq!(r.join().unwrap(), Err(ChannelError::Closed));
        }
    }

    #[test]
    fn test_close_drains_buffer_first() {
        let ch = PhaseChannel::new(ChannelMode::Fifo { capacity: 4 });
        ch.send(1);
        ch.send(2);
        ch.close();

        assert!(!ch.send(3));
        assert_eq!(ch.receive(), Ok(1));
        assert_eq!(ch.receive(), Ok(2));
        assert_eq!(ch.receive(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_concurrent_fifo_delivers_each_value_once() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let ch = Arc::new(PhaseChannel::new(ChannelMode::Fifo { capacity: TOTAL }));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let ch = Arc::clone(&ch);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Ok(v) = ch.receive() {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let ch = Arc::clone(&ch);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        assert!(ch.send(p * PER_PRODUCER + i));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        ch.close();

        let mut seen = HashSet::new();
        for c in consumers {
            for v in c.join().unwrap() {
                assert!(v < TOTAL, "received a value that was never sent: {v}");
                assert!(seen.insert(v), "value delivered twice: {v}");
            }
        }
        assert_eq!(seen.len(), TOTAL);
    }

    #[test]
    fn test_mode_serde() {
        let latest: ChannelMode = serde_yaml::from_str("mode: latest").unwrap();
        assert_eq!(latest, ChannelMode::Latest);

        let fifo: ChannelMode = serde_yaml::from_str("mode: fifo").unwrap();
        assert_eq!(
            fifo,
            ChannelMode::Fifo {
                capacity: DEFAULT_FIFO_CAPACITY
            }
        );

        let sized: ChannelMode = serde_yaml::from_str("{mode: fifo, capacity: 3}").unwrap();
        assert_eq!(sized.capacity(), 3);
    }
}
