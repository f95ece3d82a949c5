//! Inter-attempt delay for the retry loop.

use std::time::Duration;

use rand::Rng;

use crate::config::ServiceConfig;

/// Exponential schedule capped at `max`, plus up to 10% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn for_service(config: &ServiceConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_backoff_base_ms),
            Duration::from_millis(config.retry_backoff_max_ms),
        )
    }

    /// Delay before retry number `retry` (1-based). A zero base retries at once.
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 || self.base.is_zero() {
            return Duration::ZERO;
        }

        let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(31));
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_ms = (capped.as_millis() / 10) as u64;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1_000));

        assert!((100..110).contains(&backoff.delay(1).as_millis()));
        assert!((200..220).contains(&backoff.delay(2).as_millis()));
        assert!((400..440).contains(&backoff.delay(3).as_millis()));
        assert!((1_000..1_100).contains(&backoff.delay(40).as_millis()));
    }

    #[test]
    fn test_zero_base_retries_immediately() {
        let config = ServiceConfig::default();
        assert_eq!(Backoff::for_service(&config).delay(3), Duration::ZERO);

        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(0), Duration::ZERO);
    }
}
