//! Graceful termination
//!
//! [`LifecycleManager`] owns the root [`CancellationToken`] that rotation
//! plans run under. On an interrupt or quit signal it stops the relay,
//! cancels every task holding a child of that token, and exits.
//!
//! Shutdown is idempotent: a second signal, or a signal arriving while a
//! rotation is mid-wait or mid-resolution, is safe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::traits::RelayControl;

/// Result of a [`LifecycleManager::shutdown`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// This call stopped the relay and cancelled rotation tasks
    Stopped,
    /// An earlier call already did
    AlreadyStopped,
}

/// Coordinates relay shutdown and rotation cancellation
pub struct LifecycleManager {
    control: Arc<dyn RelayControl>,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl LifecycleManager {
    pub fn new(control: Arc<dyn RelayControl>) -> Self {
        Self {
            control,
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Token for a rotation task; cancelled on shutdown
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the relay, then cancel rotation tasks
    ///
    /// A relay stop failure is logged; cancellation still happens.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return ShutdownOutcome::AlreadyStopped;
        }

        info!("Shutting down: stopping relay");
        if let Err(e) = self.control.stop().await {
            warn!("Failed to stop relay: {}", e);
        }

        info!("Shutting down: cancelling rotation tasks");
        self.cancel.cancel();

        ShutdownOutcome::Stopped
    }

    /// Signal handler body: shut down, then exit with status 0
    pub async fn on_termination_signal(&self) {
        self.shutdown().await;
        info!("Program terminated by user");
        std::process::exit(0)
    }
}

/// Wait for SIGINT, SIGQUIT or SIGTERM
///
/// # Returns
///
/// The name of the signal received.
#[cfg(unix)]
pub async fn wait_for_termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigquit.recv() => "SIGQUIT",
        _ = sigterm.recv() => "SIGTERM",
    })
}

/// Wait for Ctrl-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
pub async fn wait_for_termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("CTRL-C")
}
