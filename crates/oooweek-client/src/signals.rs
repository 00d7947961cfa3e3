//! Turns SIGINT/SIGTERM into cancellation.
//!
//! The first signal cancels the shared [`CancellationToken`]; every
//! in-flight wait (browser callback, stdin, member fetches) observes it and
//! unwinds.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns the process-wide cancellation token.
#[derive(Debug, Default)]
pub struct SignalHandler {
    token: CancellationToken,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the token cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns true if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Programmatically triggers a shutdown.
    pub fn trigger_shutdown(&self) {
        self.token.cancel();
    }

    /// Spawns the signal listener task.
    ///
    /// The task exits once the token is cancelled, by a signal or otherwise.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let token = self.token.clone();

        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("failed to install signal handlers: {}", e);
                        return;
                    }
                };

            tokio::select! {
                _ = token.cancelled() => {}
                _ = sigterm.recv() => {
                    info!("received SIGTERM, cancelling");
                    token.cancel();
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, cancelling");
                    token.cancel();
                }
            }

            debug!("signal listener stopped");
        })
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let token = self.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("received Ctrl+C, cancelling");
                        token.cancel();
                    }
                }
            }
            debug!("signal listener stopped");
        })
    }
}
