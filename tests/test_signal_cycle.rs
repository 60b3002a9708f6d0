mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use common::{DEFAULT_TIMEOUT, fast_options};
use greenlight::error::SignalError;
use greenlight::phase::{Phase, PhaseTransition, RedrawPolicy, SignalController, SignalOptions};

fn collect_transitions(signal: &SignalController, n: usize) -> Vec<PhaseTransition> {
    (0..n)
        .map(|_| {
            signal
                .next_transition_timeout(DEFAULT_TIMEOUT)
                .expect("signal stopped flipping")
        })
        .collect()
}

// ============================================================================
// Alternation
// ============================================================================

#[test]
fn phases_strictly_alternate() {
    let signal = SignalController::new(fast_options(10, 20));
    signal.simulate().unwrap();

    let transitions = collect_transitions(&signal, 12);
    signal.shutdown();

    let mut expected_from = Phase::Red;
    for (i, t) in transitions.iter().enumerate() {
        assert_eq!(t.sequence, i as u64 + 1, "no flip may be skipped");
        assert_eq!(t.from, expected_from, "transition {t:?}");
        assert_eq!(t.to, t.from.toggle());
        expected_from = t.to;
    }
}

#[test]
fn starts_from_configured_phase() {
    let signal = SignalController::new(SignalOptions {
        initial_phase: Phase::Green,
        ..fast_options(10, 10)
    });
    signal.simulate().unwrap();

    let first = signal.next_transition_timeout(DEFAULT_TIMEOUT).unwrap();
    assert_eq!((first.from, first.to), (Phase::Green, Phase::Red));
}

// ============================================================================
// Timing
// ============================================================================

#[test]
fn every_interval_honours_the_drawn_duration() {
    let signal = SignalController::new(fast_options(15, 30));
    signal.simulate().unwrap();
    let drawn = signal.phase_duration().expect("duration drawn at start");
    assert!((15..=30).contains(&drawn.as_millis()), "{drawn:?}");

    let transitions = collect_transitions(&signal, 20);
    signal.shutdown();

    let slack = Duration::from_millis(250);
    for t in &transitions {
        assert!(t.elapsed >= drawn, "flip {} came early: {:?} < {drawn:?}", t.sequence, t.elapsed);
        assert!(t.elapsed <= drawn + slack, "flip {} came late: {:?}", t.sequence, t.elapsed);
    }
    assert_eq!(signal.phase_duration(), Some(drawn), "per-run duration was redrawn");
}

#[test]
fn per_cycle_durations_stay_in_bounds() {
    let signal = SignalController::new(SignalOptions {
        timing: greenlight::phase::PhaseTiming {
            redraw: RedrawPolicy::PerCycle,
            ..fast_options(10, 25).timing
        },
        ..fast_options(10, 25)
    });
    signal.simulate().unwrap();

    let transitions = collect_transitions(&signal, 10);
    for t in &transitions {
        assert!(t.elapsed >= Duration::from_millis(10), "{t:?}");
        assert!(t.elapsed <= Duration::from_millis(25 + 250), "{t:?}");
    }
}

// ============================================================================
// Waiting for green
// ============================================================================

#[test]
fn wait_returns_immediately_when_already_green() {
    let signal = SignalController::new(SignalOptions {
        initial_phase: Phase::Green,
        ..fast_options(10_000, 10_000)
    });
    signal.simulate().unwrap();

    let started = Instant::now();
    signal.wait_for_green_timeout(Duration::from_secs(1)).unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn wait_blocks_through_red() {
    let signal = SignalController::new(fast_options(60, 60));
    signal.simulate().unwrap();

    let started = Instant::now();
    signal.wait_for_green_timeout(DEFAULT_TIMEOUT).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(signal.transition_count() >= 1);
}

#[test]
fn wait_times_out_on_a_stuck_red() {
    let signal = SignalController::new(fast_options(10_000, 10_000));
    signal.simulate().unwrap();

    let err = signal
        .wait_for_green_timeout(Duration::from_millis(30))
        .unwrap_err();
    assert!(matches!(err, SignalError::WaitTimedOut { phase: Phase::Green, .. }), "{err}");
    assert_eq!(signal.waiter_count(), 0, "timed-out waiter must unregister");
}

#[test]
fn five_waiters_all_see_the_same_green() {
    let signal = Arc::new(SignalController::new(fast_options(200, 200)));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let signal = Arc::clone(&signal);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                signal.wait_for_green_timeout(DEFAULT_TIMEOUT)?;
                let phase = signal.current_phase();
                Ok::<_, SignalError>((phase, signal.transition_count()))
            })
        })
        .collect();

    barrier.wait();
    let deadline = Instant::now() + DEFAULT_TIMEOUT;
    while signal.waiter_count() < 5 {
        assert!(Instant::now() < deadline, "waiters never registered");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(signal.current_phase(), Phase::Red);
    signal.simulate().unwrap();

    for handle in handles {
        let (phase, seen) = handle.join().unwrap().unwrap();
        // Red was the phase every waiter called in on; it may only show
        // again once the signal has moved past the green.
        match phase {
            Phase::Green => assert_eq!(seen, 1, "released by the first green"),
            Phase::Red => assert!(seen >= 2, "waiter returned on the red it started on"),
        }
    }
    assert_eq!(signal.waiter_count(), 0);
}

#[test]
fn shutdown_releases_blocked_waiters() {
    let signal = Arc::new(SignalController::new(fast_options(10_000, 10_000)));
    signal.simulate().unwrap();

    let waiter = {
        let signal = Arc::clone(&signal);
        thread::spawn(move || signal.wait_for_green())
    };
    let deadline = Instant::now() + DEFAULT_TIMEOUT;
    while signal.waiter_count() == 0 {
        assert!(Instant::now() < deadline, "waiter never registered");
        thread::sleep(Duration::from_millis(1));
    }

    signal.shutdown();
    assert!(matches!(waiter.join().unwrap(), Err(SignalError::Stopped(_))));
    assert!(!signal.is_running());
    assert!(matches!(signal.wait_for_green(), Err(SignalError::Stopped(_))));
}

// ============================================================================
// Non-blocking reads
// ============================================================================

#[test]
fn current_phase_tracks_transitions() {
    let signal = SignalController::new(fast_options(200, 200));
    signal.simulate().unwrap();

    let t = signal.next_transition_timeout(DEFAULT_TIMEOUT).unwrap();
    // The next flip is at least 200ms away.
    assert_eq!(signal.current_phase(), t.to);
}
