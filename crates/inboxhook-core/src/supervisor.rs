//! Connection supervisor: owns the session and reconnects with backoff.
//!
//! ```text
//! Disconnected → Connecting → Ready → Failed → Connecting ...
//!                                  ↘ Ending        ↘ (ceiling reached) exit
//! ```

use std::future::Future;
use std::time::Duration;

use crate::dispatcher::PageAutomation;
use crate::session::{Connector, MailSession};
use crate::watcher::{WatchEnd, WatchTiming, Watcher};

/// Exponential backoff with a hard attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Reconnects allowed in a row before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// Connecting, authenticating and opening the mailbox.
    Connecting,
    /// Mailbox open; the watcher is running.
    Ready,
    /// Graceful shutdown in progress.
    Ending,
    /// The last connection failed; a reconnect may be scheduled.
    Failed,
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`.
    Retry {
        /// Attempt number, 1-based.
        attempt: u32,
        /// Backoff before the attempt.
        delay: Duration,
    },
    /// A reconnect is already scheduled; nothing to do.
    AlreadyScheduled,
    /// The ceiling was reached.
    GiveUp {
        /// Attempts made.
        attempts: u32,
    },
}

/// How [`Supervisor::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested.
    Shutdown,
    /// Reconnects were exhausted. The process should exit non-zero.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Reconnect state machine plus the loop that drives it.
#[derive(Debug)]
pub struct Supervisor {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    scheduled: bool,
}

impl Supervisor {
    /// Creates a disconnected supervisor.
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            scheduled: false,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive reconnect attempts since the last successful connect.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Enters `Connecting`, consuming any scheduled reconnect.
    pub const fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
        self.scheduled = false;
    }

    /// Enters `Ready` and resets the attempt counter.
    pub const fn on_connected(&mut self) {
        self.state = ConnectionState::Ready;
        self.attempts = 0;
    }

    /// Enters `Failed` and decides whether to reconnect.
    ///
    /// The counter is incremented before the delay is computed. A failure
    /// reported while a reconnect is already scheduled changes nothing.
    pub fn on_failure(&mut self) -> ReconnectDecision {
        self.state = ConnectionState::Failed;
        if self.scheduled {
            return ReconnectDecision::AlreadyScheduled;
        }
        if self.attempts >= self.policy.max_attempts {
            return ReconnectDecision::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        self.scheduled = true;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: self.policy.delay_for(self.attempts),
        }
    }

    /// Runs connect → watch → reconnect until shutdown or exhaustion.
    ///
    /// Each session is discarded entirely when it fails; nothing is resumed
    /// on a dead handle. Shutdown waits for a running check cycle to finish,
    /// then logs the open session out.
    pub async fn run<C, A, F>(
        &mut self,
        connector: &C,
        watcher: &mut Watcher<A>,
        timing: WatchTiming,
        shutdown: F,
    ) -> RunOutcome
    where
        C: Connector,
        A: PageAutomation,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.begin_connect();
            let connected = tokio::select! {
                result = connector.connect() => Some(result),
                () = &mut shutdown => None,
            };

            match connected {
                None => return self.shut_down(None::<C::Session>).await,
                Some(Ok(mut session)) => {
                    self.on_connected();
                    tracing::info!("connected, watching mailbox");

                    let end = watcher.watch(&mut session, timing, shutdown.as_mut()).await;
                    watcher.reset();

                    match end {
                        WatchEnd::Shutdown => return self.shut_down(Some(session)).await,
                        WatchEnd::Failed(error) => {
                            tracing::warn!(error = %error, "connection lost");
                            drop(session);
                        }
                    }
                }
                Some(Err(error)) => tracing::warn!(error = %error, "connect failed"),
            }

            match self.on_failure() {
                ReconnectDecision::Retry { attempt, delay } => {
                    tracing::info!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_secs = delay.as_secs(),
                        "reconnecting"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = &mut shutdown => return self.shut_down(None::<C::Session>).await,
                    }
                }
                ReconnectDecision::AlreadyScheduled => {}
                ReconnectDecision::GiveUp { attempts } => {
                    tracing::error!(attempts, "reconnect attempts exhausted, giving up");
                    self.state = ConnectionState::Disconnected;
                    return RunOutcome::Exhausted { attempts };
                }
            }
        }
    }

    async fn shut_down<S: MailSession>(&mut self, session: Option<S>) -> RunOutcome {
        self.state = ConnectionState::Ending;
        tracing::info!("shutting down");
        if let Some(session) = session
            && let Err(e) = session.logout().await
        {
            tracing::debug!(error = %e, "logout failed");
        }
        self.state = ConnectionState::Disconnected;
        RunOutcome::Shutdown
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_delays_double_from_base() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), secs(5));
        assert_eq!(policy.delay_for(2), secs(10));
        assert_eq!(policy.delay_for(3), secs(20));
        assert_eq!(policy.delay_for(4), secs(40));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(7), secs(300));
        assert_eq!(policy.delay_for(40), secs(300));
        assert_eq!(policy.delay_for(u32::MAX), secs(300));
    }

    #[test]
    fn test_three_failures_schedule_5_10_20() {
        let mut supervisor = Supervisor::new(ReconnectPolicy::default());
        let mut delays = Vec::new();
        for _ in 0..3 {
            supervisor.begin_connect();
            match supervisor.on_failure() {
                ReconnectDecision::Retry { delay, .. } => delays.push(delay),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(delays, vec![secs(5), secs(10), secs(20)]);
        assert_eq!(supervisor.attempts(), 3);
    }

    #[test]
    fn test_reentrant_failure_is_noop() {
        let mut supervisor = Supervisor::new(ReconnectPolicy::default());
        supervisor.begin_connect();
        assert!(matches!(supervisor.on_failure(), ReconnectDecision::Retry { .. }));
        assert_eq!(supervisor.on_failure(), ReconnectDecision::AlreadyScheduled);
        assert_eq!(supervisor.attempts(), 1);
    }

    #[test]
    fn test_gives_up_at_ceiling() {
        let mut supervisor = Supervisor::new(ReconnectPolicy {
            max_attempts: 2,
            ..ReconnectPolicy::default()
        });
        supervisor.begin_connect();
        assert!(matches!(supervisor.on_failure(), ReconnectDecision::Retry { attempt: 1, .. }));
        supervisor.begin_connect();
        assert!(matches!(supervisor.on_failure(), ReconnectDecision::Retry { attempt: 2, .. }));
        supervisor.begin_connect();
        assert_eq!(
            supervisor.on_failure(),
            ReconnectDecision::GiveUp { attempts: 2 }
        );
        assert_eq!(supervisor.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_connect_resets_attempts() {
        let mut supervisor = Supervisor::new(ReconnectPolicy::default());
        supervisor.begin_connect();
        supervisor.on_failure();
        supervisor.begin_connect();
        supervisor.on_connected();
        assert_eq!(supervisor.attempts(), 0);
        assert_eq!(supervisor.state(), ConnectionState::Ready);
        supervisor.on_failure();
        assert_eq!(supervisor.attempts(), 1);
    }
}
