//! Fixed-interval polling with optional deadline and cancellation
//!
//! Both waiting loops (the deletion drain and the rolling hand-off) sleep
//! through a `Poller`. With default `PollOptions` it never gives up, matching
//! the historical behaviour; a deadline or a cancel signal turns a stuck loop
//! into an error instead of a hang.

use super::LifecycleError;
use crate::config::PollOptions;
use crate::shutdown::ShutdownSignal;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct Poller {
    operation: String,
    interval: Duration,
    deadline: Option<Duration>,
    cancel: Option<ShutdownSignal>,
    started: Instant,
    sleeps: u64,
}

impl Poller {
    pub fn new(operation: impl Into<String>, options: &PollOptions) -> Self {
        Self {
            operation: operation.into(),
            interval: options.interval,
            deadline: options.deadline,
            cancel: options.cancel.clone(),
            started: Instant::now(),
            sleeps: 0,
        }
    }

    /// Sleep one interval
    ///
    /// # Errors
    /// * `Cancelled` - the cancel signal fired before or during the sleep
    /// * `DeadlineExceeded` - the deadline has passed
    pub async fn sleep(&mut self) -> Result<(), LifecycleError> {
        self.check()?;

        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);

        let woken = match self.cancel.as_mut() {
            Some(signal) => {
                tokio::select! {
                    _ = &mut sleep => false,
                    _ = signal.wait() => true,
                }
            }
            None => {
                (&mut sleep).await;
                false
            }
        };

        // `wait` also returns when the controller is dropped; nobody can
        // cancel any more, so finish the interval and stop listening
        if woken && !self.cancel.as_ref().is_some_and(ShutdownSignal::is_shutdown) {
            debug!(operation = %self.operation, "Cancel signal closed, polling uncancellable");
            self.cancel = None;
            sleep.await;
        }
        self.sleeps += 1;

        self.check()
    }

    /// Number of completed sleeps
    pub fn sleeps(&self) -> u64 {
        self.sleeps
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn check(&self) -> Result<(), LifecycleError> {
        if self.cancel.as_ref().is_some_and(ShutdownSignal::is_shutdown) {
            warn!(operation = %self.operation, sleeps = self.sleeps, "Polling cancelled");
            return Err(LifecycleError::Cancelled {
                operation: self.operation.clone(),
            });
        }

        if let Some(deadline) = self.deadline {
            let elapsed = self.elapsed();
            if elapsed >= deadline {
                warn!(
                    operation = %self.operation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Polling deadline exceeded"
                );
                return Err(LifecycleError::DeadlineExceeded {
                    operation: self.operation.clone(),
                    elapsed,
                });
            }
        }

        Ok(())
    }
}
