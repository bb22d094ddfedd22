//! Connection lifecycle state machine
//!
//! Pure data: no I/O happens here. Every transition takes the current time
//! as an argument so the retry schedule is deterministic under test.

use std::time::Duration;
use tokio::time::Instant;

/// Consecutive failures tolerated before entering cooldown
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Upper bound for a single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(16);

/// Quiet period after the retry budget is exhausted
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Reconnect schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub max_delay: Duration,
    pub cooldown: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_delay: DEFAULT_MAX_DELAY,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl ReconnectPolicy {
    /// Delay after the n-th failed attempt: `min(max_delay, 2^(n-1))` seconds
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let secs = 1u64 << exponent;
        Duration::from_secs(secs).min(self.max_delay)
    }
}

/// Lifecycle of one physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Backoff { until: Instant, attempt: u32 },
    ExhaustedCooldown { until: Instant },
}

impl LinkState {
    /// Begin (or restart) a connection cycle
    pub fn start(self) -> Self {
        match self {
            LinkState::Disconnected => LinkState::Connecting { attempt: 1 },
            other => other,
        }
    }

    /// The open call succeeded
    pub fn on_connect_success(self) -> Self {
        match self {
            LinkState::Connecting { .. } => LinkState::Connected,
            other => other,
        }
    }

    /// The open call failed with a recoverable error
    pub fn on_connect_failure(self, now: Instant, policy: &ReconnectPolicy) -> Self {
        match self {
            LinkState::Connecting { attempt } => LinkState::Backoff {
                until: now + policy.delay(attempt),
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    /// Advance timers: an elapsed backoff retries (or enters cooldown once the
    /// retry budget is spent), an elapsed cooldown starts a fresh cycle
    pub fn tick(self, now: Instant, policy: &ReconnectPolicy) -> Self {
        match self {
            LinkState::Backoff { until, attempt } if now >= until => {
                if attempt > policy.max_retries {
                    LinkState::ExhaustedCooldown {
                        until: now + policy.cooldown,
                    }
                } else {
                    LinkState::Connecting { attempt }
                }
            }
            LinkState::ExhaustedCooldown { until } if now >= until => {
                LinkState::Connecting { attempt: 1 }
            }
            other => other,
        }
    }

    /// Read or write reported a broken connection
    pub fn on_link_lost(self) -> Self {
        LinkState::Disconnected
    }

    /// Explicit close from any state
    pub fn close(self) -> Self {
        LinkState::Disconnected
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }

    /// Current retry attempt, zero when not retrying
    pub fn attempt(&self) -> u32 {
        match self {
            LinkState::Connecting { attempt } | LinkState::Backoff { attempt, .. } => *attempt,
            _ => 0,
        }
    }

    /// Time left before the next transition can happen
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self {
            LinkState::Backoff { until, .. } | LinkState::ExhaustedCooldown { until } => {
                Some(until.saturating_duration_since(now))
            }
            _ => None,
        }
    }

    /// Stable name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting { .. } => "connecting",
            LinkState::Connected => "connected",
            LinkState::Backoff { .. } => "backoff",
            LinkState::ExhaustedCooldown { .. } => "cooldown",
        }
    }

    /// Numeric code for the link state gauge
    pub fn code(&self) -> i64 {
        match self {
            LinkState::Disconnected => 0,
            LinkState::Connecting { .. } => 1,
            LinkState::Connected => 2,
            LinkState::Backoff { .. } => 3,
            LinkState::ExhaustedCooldown { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=7).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 16, 16]);
    }

    #[test]
    fn test_backoff_sequence_then_cooldown() {
        let policy = ReconnectPolicy::default();
        let mut now = Instant::now();
        let mut state = LinkState::Disconnected.start();
        let mut delays = Vec::new();

        for _ in 0..5 {
            assert!(matches!(state, LinkState::Connecting { .. }));
            state = state.on_connect_failure(now, &policy);
            let wait = state.remaining(now).unwrap();
            delays.push(wait.as_secs());
            now += wait;
            state = state.tick(now, &policy);
        }

        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert!(matches!(state, LinkState::ExhaustedCooldown { .. }));
        assert_eq!(state.remaining(now), Some(Duration::from_secs(30)));

        now += Duration::from_secs(30);
        state = state.tick(now, &policy);
        assert_eq!(state, LinkState::Connecting { attempt: 1 });
    }

    #[test]
    fn test_attempt_counter_monotonic_while_failing() {
        let policy = ReconnectPolicy::default();
        let mut now = Instant::now();
        let mut state = LinkState::Disconnected.start();
        let mut last = 0;

        for _ in 0..4 {
            state = state.on_connect_failure(now, &policy);
            assert!(state.attempt() >= last);
            last = state.attempt();
            now += Duration::from_secs(60);
            state = state.tick(now, &policy);
            assert!(state.attempt() >= last);
        }
    }

    #[test]
    fn test_backoff_not_elapsed_stays() {
        let policy = ReconnectPolicy::default();
        let now = Instant::now();
        let state = LinkState::Connecting { attempt: 3 }.on_connect_failure(now, &policy);

        let later = now + Duration::from_secs(2);
        assert_eq!(state.tick(later, &policy), state);
    }

    #[test]
    fn test_success_resets_attempts() {
        let state = LinkState::Connecting { attempt: 4 }.on_connect_success();
        assert_eq!(state, LinkState::Connected);
        assert_eq!(state.attempt(), 0);

        let lost = state.on_link_lost();
        assert_eq!(lost.start(), LinkState::Connecting { attempt: 1 });
    }

    #[test]
    fn test_close_from_any_state() {
        let now = Instant::now();
        let states = [
            LinkState::Connected,
            LinkState::Connecting { attempt: 2 },
            LinkState::Backoff { until: now, attempt: 3 },
            LinkState::ExhaustedCooldown { until: now },
        ];
        for state in states {
            assert_eq!(state.close(), LinkState::Disconnected);
        }
    }
}
