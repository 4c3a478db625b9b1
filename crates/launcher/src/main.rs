use clap::Parser;
use launcher_core::exit::ExitSignal;
use tokio_util::sync::CancellationToken;

mod cli;
mod commands;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    let cancel = CancellationToken::new();
    let listener = tokio::spawn(forward_interrupts(cancel.clone()));

    let result = parsed.dispatch(cancel).await;
    listener.abort();

    // Map the outcome onto the exit status contract (77 asks the caller to retry)
    let signal = ExitSignal::from_result(&result);
    if let Some(message) = signal.message() {
        eprintln!("{}", message);
    }
    std::process::exit(signal.exit_code());
}

/// Exit status used when a second signal forces the launcher down
const FORCED_EXIT_CODE: i32 = 130;

/// Cancel the running phase on SIGINT or SIGTERM so the child gets interrupted.
/// A second signal exits immediately without waiting for the child.
#[cfg(unix)]
async fn forward_interrupts(cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    // Logging is not initialized yet when this runs
    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        eprintln!("Failed to install signal handlers");
        return;
    };

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    eprintln!("Command interrupted");
    cancel.cancel();

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    eprintln!("Forced exit");
    std::process::exit(FORCED_EXIT_CODE);
}

#[cfg(not(unix))]
async fn forward_interrupts(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Command interrupted");
        cancel.cancel();
    }
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Forced exit");
        std::process::exit(FORCED_EXIT_CODE);
    }
}
