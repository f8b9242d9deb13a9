//! Reconnection Policy
//!
//! Decides, after the connection closed, whether the session should try again and
//! how long it should wait first. The policy is a plain value; the session
//! controller owns the attempt counter and the timer.

use crate::protocol::NORMAL_CLOSURE;
use std::time::Duration;

/// Delay used by [`ReconnectPolicy::default`].
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// What to do after a closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// The closure was intentional; stay disconnected.
    Stop,
    /// Reconnect once the delay has elapsed.
    RetryAfter(Duration),
}

/// The retry strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectPolicy {
    /// Always wait the same amount of time.
    Fixed(Duration),
    /// Wait `base * factor^attempt`, never longer than `cap`.
    Backoff {
        base: Duration,
        factor: f64,
        cap: Duration,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Exponential backoff starting at one second, doubling, capped at thirty.
    pub fn standard_backoff() -> Self {
        Self::Backoff {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(30),
        }
    }

    /// Decides what follows a closure with `code`, given how many reconnect
    /// attempts have already been made since the last successful open.
    ///
    /// There is no retry ceiling: any code other than normal closure retries.
    pub fn decide(&self, code: u16, attempt: u32) -> ReconnectDecision {
        if code == NORMAL_CLOSURE {
            return ReconnectDecision::Stop;
        }
        ReconnectDecision::RetryAfter(self.delay_for(attempt))
    }

    /// The wait before reconnect attempt number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Backoff { base, factor, cap } => {
                let exponent = attempt.min(i32::MAX as u32) as i32;
                let scaled = base.as_secs_f64() * factor.max(1.0).powi(exponent);
                if !scaled.is_finite() || scaled >= cap.as_secs_f64() {
                    cap
                } else {
                    Duration::from_secs_f64(scaled)
                }
            }
        }
    }
}

/// Reconnect bookkeeping, reset whenever a connection reaches open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectAttempt {
    /// Reconnects scheduled since the last successful open.
    pub count: u32,
    /// Delay of the most recently scheduled reconnect.
    pub next_delay: Option<Duration>,
}
