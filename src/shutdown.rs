//! Cancellation of in-flight lifecycle operations
//!
//! The binary wires SIGTERM/SIGINT into a `ShutdownController`; the drain and
//! rolling loops hold a `ShutdownSignal` and stop at their next sleep. A
//! cancelled operation leaves the cluster exactly as the last completed API
//! call left it. Nothing is rolled back.

use tokio::sync::watch;
use tracing::{info, warn};

/// Receiving side; cheap to clone into every loop that polls
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once cancellation has been requested
    ///
    /// A dropped controller counts as cancellation.
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                break;
            }
        }
    }

    /// Non-blocking check
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Sending side, owned by whoever decides to cancel
#[derive(Debug)]
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn shutdown(&self) {
        if self.sender.send_replace(true) {
            return;
        }
        info!("Cancellation requested, stopping at the next poll");
    }

    /// Hand out another receiver for the same channel
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Create a (controller, signal) pair, initially not cancelled
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Wait for SIGTERM or SIGINT and return the name of the signal received
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    warn!(signal = name, "Received termination signal");
    Ok(name)
}

/// Wait for Ctrl+C (non-unix)
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    warn!(signal = "CTRL_C", "Received termination signal");
    Ok("CTRL_C")
}

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod tests;
