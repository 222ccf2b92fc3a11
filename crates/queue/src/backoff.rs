/// Retry backoff as an explicit value object: first retry waits `base_ms`,
/// each further attempt doubles the wait, capped at `cap_ms`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, cap_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            cap_ms,
            max_attempts,
        }
    }

    /// Delay before the next attempt, given how many attempts have been made.
    ///
    /// `attempts_made` is at least 1 when this is consulted (the failing
    /// attempt counts).
    pub fn delay_ms(&self, attempts_made: u32) -> u64 {
        let exp = attempts_made.saturating_sub(1).min(32);
        let delay = self.base_ms.saturating_mul(1u64 << exp);
        delay.min(self.cap_ms)
    }

    /// Whether another attempt is allowed after `attempts_made` tries.
    pub fn retriable(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 60_000,
            max_attempts: 3,
        }
    }
}
