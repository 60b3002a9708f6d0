//! `greenlight` - simulated traffic signal

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use clap::Parser;
use tokio_util::sync::CancellationToken;

use greenlight::cli::args::Cli;
use greenlight::cli::commands;
use greenlight::error::ExitCode;
use greenlight::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        init_logging(cli.log_format, cli.verbose, cli.color);
    }

    let cancel = CancellationToken::new();
    let interrupted = Arc::new(AtomicI32::new(ExitCode::SUCCESS));

    // Spawn signal handler for graceful shutdown
    {
        let cancel = cancel.clone();
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            else {
                eprintln!("error: failed to register SIGTERM handler");
                return;
            };

            let code = tokio::select! {
                _ = tokio::signal::ctrl_c() => ExitCode::INTERRUPTED,
                _ = sigterm.recv() => ExitCode::TERMINATED,
            };
            interrupted.store(code, Ordering::SeqCst);
            cancel.cancel();

            eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
                _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
            }
        });
    }

    let result = commands::dispatch(cli, cancel).await;

    match result {
        Ok(()) => std::process::exit(interrupted.load(Ordering::SeqCst)),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
