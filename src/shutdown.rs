//! Graceful shutdown coordinator.
//!
//! Listens for SIGINT (Ctrl+C), SIGTERM, and SIGHUP for the whole run. The
//! first signal cancels the shared [`CancellationToken`] and saves the
//! checkpoint. The main loop then stops at its next suspension point,
//! writes the checkpoint again on the way out and exits with
//! [`EXIT_INTERRUPTED`]. If it has not exited after a grace period, the
//! listener saves and exits on its behalf. Signals arriving while that is in
//! progress are ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointStore;

/// Exit status of a run stopped by a signal. Resume by running again.
pub const EXIT_INTERRUPTED: i32 = 130;

/// How long the main loop gets to stop after cancellation before the
/// listener exits the process itself.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Cancels in-flight work and flushes the checkpoint, exactly once.
#[derive(Debug)]
pub struct ShutdownController {
    token: CancellationToken,
    checkpoint: Arc<CheckpointStore>,
    triggered: AtomicBool,
    grace: Duration,
}

impl ShutdownController {
    pub fn new(token: CancellationToken, checkpoint: Arc<CheckpointStore>) -> Self {
        Self {
            token,
            checkpoint,
            triggered: AtomicBool::new(false),
            grace: SHUTDOWN_GRACE,
        }
    }

    #[cfg(test)]
    fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[cfg(test)]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the token and save the checkpoint.
    ///
    /// Does not exit: records the main loop writes while unwinding are kept
    /// by its own final save. Returns `false` without doing anything if an
    /// earlier call already did.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        self.save();
        true
    }

    /// Wait out the grace period, then save the checkpoint again.
    ///
    /// Only reached when the main loop failed to stop in time.
    async fn flush_after_grace(&self) {
        tokio::time::sleep(self.grace).await;
        tracing::warn!(
            "Run did not stop within {}s of the shutdown signal, exiting",
            self.grace.as_secs()
        );
        self.save();
    }

    fn save(&self) {
        if self.checkpoint.save_or_warn() {
            tracing::info!(
                "Saved status of {} files to {}",
                self.checkpoint.len(),
                self.checkpoint.path().display()
            );
        }
    }
}

/// Spawn the signal listener. The listener lives until the process exits.
pub fn install_signal_handler(controller: Arc<ShutdownController>) -> anyhow::Result<()> {
    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate())?,
            signal(SignalKind::hangup())?,
        )
    };

    tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                    _ = sighup.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
            }

            if controller.trigger() {
                tracing::info!("Received shutdown signal, run interrupted; run again to resume");
                let fallback = controller.clone();
                tokio::spawn(async move {
                    fallback.flush_after_grace().await;
                    std::process::exit(EXIT_INTERRUPTED);
                });
                continue;
            }
            tracing::warn!("Shutdown already in progress");
        }
    });

    Ok(())
}
