//! Explicit configuration values
//!
//! Nothing is cached process-wide: the binary builds these once from flags and
//! environment and passes them down.

use crate::shutdown::ShutdownSignal;
use std::time::Duration;

/// Default interval between polls of the drain and rolling loops
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on extra ready replicas during a rolling hand-off
pub const DEFAULT_MAX_REPLICAS_EXCESS: u32 = 1;

/// How to reach the cluster
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// API server URL; `None` infers from kubeconfig or the in-cluster environment
    pub endpoint: Option<String>,

    /// Skip server certificate verification
    pub accept_invalid_certs: bool,
}

/// Polling behaviour shared by the drain and rolling loops
#[derive(Clone)]
pub struct PollOptions {
    pub interval: Duration,

    /// Give up after this long. `None` polls until the condition holds.
    pub deadline: Option<Duration>,

    /// Abort at the next sleep once this signal fires
    pub cancel: Option<ShutdownSignal>,
}

impl PollOptions {
    /// Poll forever at `interval`, no cancellation
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: ShutdownSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::unbounded(DEFAULT_POLL_INTERVAL)
    }
}

impl std::fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOptions")
            .field("interval", &self.interval)
            .field("deadline", &self.deadline)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Tunables for the lifecycle engine
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Old + new ready replicas may exceed the target by at most this many
    pub max_replicas_excess: u32,

    pub poll: PollOptions,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            max_replicas_excess: DEFAULT_MAX_REPLICAS_EXCESS,
            poll: PollOptions::default(),
        }
    }
}

/// Parse a duration string like "5m", "30s", "1h" into std::time::Duration
///
/// Supported formats:
/// - "30s" → 30 seconds (max 24h = 86400s)
/// - "5m" → 5 minutes (max 24h = 1440m)
/// - "2h" → 2 hours (max 1 week = 168h)
///
/// Zero is rejected.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();

    if duration_str.is_empty() {
        return None;
    }

    let unit = duration_str.chars().last()?;
    let number_str = &duration_str[..duration_str.len() - unit.len_utf8()];
    let number: u64 = number_str.parse().ok()?;

    if number == 0 {
        return None;
    }

    match unit {
        's' if number <= 86400 => Some(Duration::from_secs(number)),
        'm' if number <= 1440 => number.checked_mul(60).map(Duration::from_secs),
        'h' if number <= 168 => number.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
