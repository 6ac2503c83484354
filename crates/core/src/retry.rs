use std::time::Duration;

pub use ::backoff::backoff::Backoff;

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// `min(base * 2^attempt, ceiling)`, saturating instead of overflowing for
/// large attempt indices.
pub fn compute_backoff_delay(attempt: u32, base: Duration, ceiling: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(ceiling)
}

/// Bounded reconnect schedule for realtime subscriptions.
///
/// Yields `max_attempts` delays and then `None`; `reset` is called once a
/// subscription is confirmed so the next failure starts from the base delay.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub ceiling: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base: Duration, ceiling: Duration) -> Self {
        Self {
            max_attempts,
            base,
            ceiling,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RECONNECT_ATTEMPTS,
            DEFAULT_BASE_DELAY,
            DEFAULT_MAX_DELAY,
        )
    }
}

impl Backoff for ReconnectPolicy {
    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = compute_backoff_delay(self.attempts, self.base, self.ceiling);
        self.attempts += 1;
        Some(delay)
    }
}
