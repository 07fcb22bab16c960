use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule: attempt `n` (1-based) waits up to
/// `slot * 2^min(n - 1, ceiling)`, jittered into the upper half of that
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub slot: Duration,
    pub ceiling: u32,
    pub jitter: bool,
}

impl Backoff {
    pub const fn new(slot: Duration, ceiling: u32) -> Self {
        Self {
            slot,
            ceiling,
            jitter: true,
        }
    }

    /// Short waits for transient transport hiccups and aborted operations.
    pub const fn fast() -> Self {
        Self::new(Duration::from_millis(5), 6)
    }

    /// Long waits for an overloaded or exhausted server.
    pub const fn slow() -> Self {
        Self::new(Duration::from_secs(1), 6)
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before retrying after attempt number `attempt` (1-based) failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(self.ceiling).min(31);
        let max = self.slot.saturating_mul(1u32 << exp);
        if !self.jitter || max.is_zero() {
            return max;
        }
        let half = max / 2;
        let spread = (max - half).as_nanos() as u64;
        let offset = rand::thread_rng().gen_range(0..=spread);
        half + Duration::from_nanos(offset)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::fast()
    }
}
