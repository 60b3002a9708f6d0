//! `run` command
//!
//! Starts a signal, releases a set of observers on every green, and
//! streams structured events until the cycle limit is reached or the
//! process is interrupted.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::args::RunArgs;
use crate::config::loader::ConfigLoader;
use crate::config::schema::{GreenlightConfig, SignalConfig};
use crate::config::validation::Validator;
use crate::error::{ConfigError, GreenlightError, SignalError};
use crate::observability::{Event, EventEmitter};
use crate::phase::{Phase, SignalController};

/// Run a signal until `--cycles` transitions have happened or `cancel`
/// fires.
///
/// # Errors
///
/// Returns a usage error for `--cycles 0`, a config error if the
/// configuration is invalid, an I/O error if the events file cannot be
/// created, or a signal error if cycling cannot start.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), GreenlightError> {
    if args.cycles == Some(0) {
        return Err(GreenlightError::Usage("--cycles must be at least 1".to_owned()));
    }
    let signal = resolve_config(args)?;

    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let emitter = Arc::new(match args.events_file {
        Some(ref path) => EventEmitter::from_file(path)?,
        None => EventEmitter::stdout(),
    });

    let controller = Arc::new(SignalController::new(signal.to_options()));
    controller.simulate()?;
    emitter.emit(Event::SignalStarted {
        timestamp: Utc::now(),
        signal: signal.name.clone(),
        initial_phase: signal.initial_phase,
        phase_duration_ms: controller
            .phase_duration()
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
    });

    let done = cancel.child_token();
    let mut tasks: Vec<JoinHandle<()>> = (0..args.observers)
        .map(|observer| {
            let controller = Arc::clone(&controller);
            let emitter = Arc::clone(&emitter);
            tokio::task::spawn_blocking(move || observe(observer, &controller, &emitter))
        })
        .collect();
    {
        let controller = Arc::clone(&controller);
        let emitter = Arc::clone(&emitter);
        let done = done.clone();
        let limit = args.cycles;
        tasks.push(tokio::task::spawn_blocking(move || {
            follow_transitions(&controller, &emitter, limit, &done);
        }));
    }

    done.cancelled().await;
    let reason = if cancel.is_cancelled() {
        "interrupted"
    } else {
        "cycle limit reached"
    };
    tracing::info!(signal = %signal.name, reason, "stopping signal");

    let stopper = Arc::clone(&controller);
    tokio::task::spawn_blocking(move || stopper.shutdown())
        .await
        .map_err(|e| GreenlightError::Io(std::io::Error::other(e)))?;
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "observer task failed");
        }
    }

    emitter.emit(Event::SignalStopped {
        timestamp: Utc::now(),
        reason: reason.to_owned(),
        transitions: controller.transition_count(),
    });
    Ok(())
}

/// Loads the configuration file (if any), applies flag overrides and
/// validates the result.
fn resolve_config(args: &RunArgs) -> Result<SignalConfig, GreenlightError> {
    let mut signal = if let Some(ref path) = args.config {
        tracing::info!(config = %path.display(), "loading configuration");
        let result = ConfigLoader::default().load(path)?;
        for warning in &result.warnings {
            tracing::warn!(
                location = warning.location.as_deref().unwrap_or("<unknown>"),
                "{}",
                warning.message
            );
        }
        result.config.signal.clone()
    } else {
        SignalConfig::default()
    };

    if let Some(ref name) = args.name {
        signal.name.clone_from(name);
    }
    if let Some(min) = args.min_duration {
        signal.phase_duration.min = min;
    }
    if let Some(max) = args.max_duration {
        signal.phase_duration.max = max;
    }
    if let Some(poll) = args.poll_interval {
        signal.poll_interval = poll;
    }
    if let Some(redraw) = args.redraw {
        signal.redraw = redraw.into();
    }
    if let Some(channel) = args.channel {
        signal.channel = channel.to_mode(args.fifo_capacity);
    }
    if args.seed.is_some() {
        signal.seed = args.seed;
    }

    let config = GreenlightConfig { signal };
    let result = Validator::new().validate(&config);
    if result.has_errors() {
        let path = args
            .config
            .as_deref()
            .map_or_else(|| "<cli>".to_owned(), |p| p.display().to_string());
        return Err(ConfigError::ValidationError {
            path,
            errors: result.errors,
        }
        .into());
    }
    for warning in &result.warnings {
        tracing::warn!(location = %warning.path, "{}", warning.message);
    }

    Ok(config.signal)
}

/// Observer loop: wait for green, report, then wait out the green phase.
fn observe(observer: usize, controller: &SignalController, emitter: &EventEmitter) {
    loop {
        let started = Instant::now();
        match controller.wait_for_green() {
            Ok(()) => {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(observer, waited_ms, "observer saw green");
                emitter.emit(Event::ObserverReleased {
                    timestamp: Utc::now(),
                    observer,
                    waited_ms,
                });
            }
            Err(SignalError::Stopped(_)) => break,
            Err(e) => {
                crate::observability::metrics::record_error("observer");
                tracing::warn!(observer, error = %e, "observer wait failed");
                break;
            }
        }

        if controller.wait_for_phase(Phase::Red, None).is_err() {
            break;
        }
    }
    tracing::debug!(observer, "observer finished");
}

/// Drains the transition feed into `PhaseChanged` events and cancels
/// `done` once `limit` transitions have happened.
fn follow_transitions(
    controller: &SignalController,
    emitter: &EventEmitter,
    limit: Option<u64>,
    done: &CancellationToken,
) {
    while let Ok(transition) = controller.next_transition() {
        emitter.emit(Event::phase_changed(&transition));
        if limit.is_some_and(|limit| transition.sequence >= limit) {
            done.cancel();
            return;
        }
    }
}
