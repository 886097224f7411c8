//! Bounded-attempt, fixed-interval reconnection.

use tokio::time::{Instant, sleep_until};
use tracing::{error, info};

use super::config::RetryPolicy;
use super::manager::ConnectionManager;
use super::transport::Transport;

/// Result of a reconnection episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A new link is up after `attempts` attempts.
    Recovered { attempts: u32 },
    /// Every allowed attempt failed.
    ExhaustedAttempts { attempts: u32 },
}

impl ReconnectOutcome {
    /// Check if the connection was re-established.
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Drives reconnection attempts according to a [`RetryPolicy`].
///
/// Never shuts anything down itself; the caller decides what exhaustion means.
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: RetryPolicy,
    attempts: u32,
}

impl Reconnector {
    /// Create a reconnector for the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    /// The policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempts made in the current episode.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Try to re-establish the manager's connection.
    ///
    /// The first attempt starts immediately. Each later attempt starts no
    /// earlier than `interval` after the start of the previous one, measured
    /// on the monotonic clock.
    pub async fn reconnect_with_backoff<T: Transport>(
        &mut self,
        manager: &mut ConnectionManager<T>,
    ) -> ReconnectOutcome {
        let interval = self.policy.interval;
        let mut last_started: Option<Instant> = None;

        while self.policy.should_retry(self.attempts) {
            if let Some(started) = last_started {
                sleep_until(started + interval).await;
            }
            last_started = Some(Instant::now());
            self.attempts += 1;

            match manager.connect().await {
                Ok(()) => {
                    let attempts = self.attempts;
                    self.attempts = 0;
                    info!(attempts, "Reconnected");
                    return ReconnectOutcome::Recovered { attempts };
                }
                Err(e) => {
                    error!(
                        error = %e,
                        attempts_remaining = self.policy.remaining(self.attempts),
                        interval_secs = interval.as_secs_f64(),
                        "Reconnection failed"
                    );
                }
            }
        }

        ReconnectOutcome::ExhaustedAttempts {
            attempts: self.attempts,
        }
    }
}
