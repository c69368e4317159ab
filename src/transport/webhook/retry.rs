use rand::Rng;
use std::time::Duration;

/// Exponential backoff: `base * 2^retry_count`, optionally jittered, never
/// above `max_delay`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Backoff {
    pub(crate) fn delay(&self, retry_count: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(retry_count);
        let delay = self
            .base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay);

        if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            delay.mul_f64(factor).min(self.max_delay)
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(jitter: bool) -> Backoff {
        Backoff {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter,
        }
    }

    #[test]
    fn test_powers_of_two_seconds() {
        let backoff = backoff(false);
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        assert_eq!(backoff(false).delay(40), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let backoff = backoff(true);
        for _ in 0..20 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max_delay() {
        let backoff = Backoff {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = backoff.delay(6);
            assert!(delay <= Duration::from_secs(4));
            assert!(delay >= Duration::from_secs(2));
        }
    }
}
