//! Bounded polling used wherever something has to "appear" (host panel, renderer).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Interval multiplier applied after each miss (1.0 = fixed interval)
    pub backoff: f32,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: 1.0,
            max_interval: interval,
        }
    }

    pub fn with_backoff(mut self, factor: f32, max_interval: Duration) -> Self {
        self.backoff = factor.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f32(self.backoff).min(self.max_interval)
    }
}

/// Run `check` until it returns true or the attempts run out.
///
/// The first check happens immediately; the policy interval separates the rest.
pub async fn await_condition<F>(policy: RetryPolicy, mut check: F) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    let mut interval = policy.interval;
    for attempt in 1..=policy.max_attempts {
        if check() {
            return WaitOutcome::Ready;
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(interval).await;
            interval = policy.next_interval(interval);
        }
    }
    WaitOutcome::TimedOut
}
