use std::time::Duration;

use rand::Rng;

/// Exponential backoff with up to 25% jitter, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub const fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// Delay before retry number `retry`, counting from 1. Retry 0 never waits.
    pub fn delay(&self, retry: u8) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let factor = 1u64.checked_shl(u32::from(retry - 1)).unwrap_or(u64::MAX);
        let nominal = base_ms.saturating_mul(factor);
        let jitter = match nominal / 4 {
            0 => 0,
            spread => rand::rng().random_range(0..=spread),
        };

        Duration::from_millis(nominal.saturating_add(jitter)).min(self.max)
    }
}
