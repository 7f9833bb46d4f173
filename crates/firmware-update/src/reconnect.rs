//! Post-reboot reconnect supervision.
//!
//! After a reboot the device drops off the network for a while. The
//! supervisor probes it at a fixed interval until it answers or the attempt
//! budget runs out. Cancelling the token stops it at once: no further probe
//! is sent and no outcome other than `Cancelled` is reported.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between reconnect probes.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(2000);

/// Probes sent before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Configuration for reconnect polling.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Time between the starts of two consecutive probes.
    pub interval: Duration,
    /// Probes sent before giving up (at least one is always sent).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// How a supervision run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A probe got an answer on attempt `attempts`.
    Reconnected { attempts: u32 },
    /// Every probe failed.
    Exhausted { attempts: u32 },
    /// The run was torn down.
    Cancelled,
}

/// Attempt counter for one supervision run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempts {
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectAttempts {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Records an attempt and returns its 1-based number, or `None` once
    /// the budget is spent.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Probes until the device answers, the budget is spent, or `cancel` fires.
///
/// The first probe goes out immediately, later ones every
/// `config.interval`. Probes never overlap: a slow probe delays the next
/// one. `on_attempt(attempt, max_attempts)` runs right before each probe.
pub async fn supervise<P, Fut, E, A>(
    config: &ReconnectConfig,
    cancel: &CancellationToken,
    mut probe: P,
    mut on_attempt: A,
) -> ReconnectOutcome
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
    A: FnMut(u32, u32),
{
    let mut counter = ReconnectAttempts::new(config.max_attempts);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while let Some(attempt) = counter.next_attempt() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempt, "reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        on_attempt(attempt, counter.max_attempts());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempt, "reconnect cancelled during probe");
                return ReconnectOutcome::Cancelled;
            }
            result = probe() => result,
        };

        match result {
            Ok(()) => {
                info!(attempt, "device answered, reconnected");
                return ReconnectOutcome::Reconnected { attempts: attempt };
            }
            Err(e) => {
                debug!(attempt, max = counter.max_attempts(), error = %e, "device not reachable yet");
            }
        }
    }

    warn!(attempts = counter.attempts(), "device did not come back, giving up");
    ReconnectOutcome::Exhausted {
        attempts: counter.attempts(),
    }
}
