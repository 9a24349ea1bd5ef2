use crate::shared::config::SyncConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter for gateway submissions.
///
/// The ceiling doubles per attempt up to `cap`. The delay for attempt `n` is
/// drawn uniformly from `(ceiling(n - 1), ceiling(n)]`, so successive delays for
/// one key grow strictly until the cap is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap: cap.max(base),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.backoff_base(), config.backoff_cap(), config.max_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `true` once `attempts` submissions have been made and the key should be
    /// handed to an operator instead of retried.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    pub fn ceiling(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let cap_ms = self.cap.as_millis().min(u128::from(u64::MAX)) as u64;
        Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let upper = self.ceiling(attempt).as_millis() as u64;
        let lower = self.ceiling(attempt.saturating_sub(1)).as_millis() as u64;
        if upper <= lower {
            return Duration::from_millis(upper);
        }
        Duration::from_millis(rng.gen_range(lower + 1..=upper))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(300), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ceiling_doubles_until_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 10);
        assert_eq!(policy.ceiling(1), Duration::from_secs(1));
        assert_eq!(policy.ceiling(2), Duration::from_secs(2));
        assert_eq!(policy.ceiling(3), Duration::from_secs(4));
        assert_eq!(policy.ceiling(4), Duration::from_secs(5));
        assert_eq!(policy.ceiling(64), Duration::from_secs(5));
    }

    #[test]
    fn consecutive_delays_strictly_increase_until_cap() {
        let policy = RetryPolicy::new(Duration::from_millis(500), Duration::from_secs(60), 10);

        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let delays: Vec<_> = (1..=3).map(|n| policy.delay_with(n, &mut rng)).collect();
            assert!(delays[0] < delays[1] && delays[1] < delays[2], "{delays:?}");
            assert!(delays[2] <= policy.ceiling(3));
        }
    }

    #[test]
    fn delay_pins_to_cap_once_reached() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(2), 10);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(policy.delay_with(5, &mut rng), Duration::from_secs(2));
        assert_eq!(policy.delay_with(6, &mut rng), Duration::from_secs(2));
    }

    #[test]
    fn exhaustion_respects_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(2), 3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }
}
