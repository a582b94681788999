//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Retry policy for failed tasks.
///
/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay for the first retry, and the fallback when the computed delay is unusable.
    pub base_delay: Duration,

    /// Overflow guard. A jittered delay above this falls back to `base_delay`.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_nanos(i64::MAX as u64 / 2),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay: `base_delay * 2^(attempts - 1)`.
    ///
    /// `None` when the value does not fit under `max_delay`.
    pub fn nominal_delay(&self, attempts: u32) -> Option<Duration> {
        let nanos = self.nominal_nanos(attempts)?;
        (nanos <= self.max_delay.as_nanos()).then(|| duration_from_nanos(nanos))
    }

    fn nominal_nanos(&self, attempts: u32) -> Option<u128> {
        let factor = 1u128.checked_shl(attempts.saturating_sub(1))?;
        self.base_delay.as_nanos().checked_mul(factor)
    }

    /// Calculate delay for the next retry.
    ///
    /// # Arguments
    /// * `attempts` - Failed executions so far (1-indexed).
    /// * `rng` - Source for the jitter.
    ///
    /// # Returns
    /// `nominal ± jitter`, where jitter is uniform in `[0, nominal / 2]` and the
    /// sign is a coin flip. Falls back to `base_delay` on overflow or when the
    /// result exceeds `max_delay`.
    ///
    /// With the default base of 100ms:
    /// - attempt 1: 50ms..=150ms
    /// - attempt 2: 100ms..=300ms
    /// - attempt 3: 200ms..=600ms
    pub fn next_delay<R: Rng + ?Sized>(&self, attempts: u32, rng: &mut R) -> Duration {
        let Some(nominal) = self.nominal_nanos(attempts) else {
            return self.base_delay;
        };

        let jitter = rng.gen_range(0..=nominal / 2);
        let jittered = if rng.gen_bool(0.5) {
            nominal.checked_sub(jitter)
        } else {
            nominal.checked_add(jitter)
        };

        match jittered {
            Some(nanos) if nanos <= self.max_delay.as_nanos() => duration_from_nanos(nanos),
            _ => self.base_delay,
        }
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    // remainder is always < 1e9
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, subsec)
}
