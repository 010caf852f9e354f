//! Process shutdown signaling.
//!
//! Bridges unix termination signals into a [`CancellationToken`] the HTTP
//! server awaits for graceful shutdown, so in-flight settlements finish
//! before the listener closes.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Watches for SIGTERM and SIGINT and cancels its token on the first one.
#[derive(Debug)]
pub struct SigDown {
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Installs the signal listeners and spawns the watcher task.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let cancellation_token = CancellationToken::new();
        let trigger = cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => trigger.cancel(),
                _ = sigint.recv() => trigger.cancel(),
            }
        });
        Ok(SigDown { cancellation_token })
    }

    /// A token cancelled once a termination signal arrives.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
