//! Backoff strategies for computing retry delays
//!
//! A [`BackoffStrategy`] is a pure function from attempt number to delay,
//! given its configured parameters and an injected [`RandomSource`] for the
//! jittered variants. The engine never sleeps; it hands the computed delay
//! back to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::MAX_BACKOFF_EXPONENT;
use crate::error::{RetryError, RetryResult};
use crate::random::{RandomSource, ThreadLocalRandom};

/// Strategy for calculating the delay before a retry attempt
#[derive(Clone)]
pub struct BackoffStrategy {
    kind: Kind,
    random: Arc<dyn RandomSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Always zero delay
    Immediate,
    /// Fixed delay, optionally jittered over `[0, delay]`
    Fixed { delay: Duration, jitter: bool },
    /// Exponential: attempt 1 is free, attempt n >= 2 waits
    /// `min(max, base * 2^(n-2))` before jitter
    Exponential { base: Duration, max: Duration, jitter: Jitter },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Jitter {
    None,
    /// Uniform over `[0, computed]`
    Full,
    /// Uniform over `[computed / 2, computed]`
    Half,
}

impl BackoffStrategy {
    /// Retry without waiting.
    pub fn immediate() -> Self {
        Self::from_kind(Kind::Immediate)
    }

    /// Wait exactly `delay` before every retry.
    pub fn fixed_delay(delay: Duration) -> Self {
        Self::from_kind(Kind::Fixed { delay, jitter: false })
    }

    /// Wait a uniformly random duration in `[0, delay]` before every retry.
    pub fn fixed_delay_jittered(delay: Duration) -> Self {
        Self::from_kind(Kind::Fixed { delay, jitter: true })
    }

    /// Exponential backoff without jitter, capped at `max`.
    pub fn exponential_delay(base: Duration, max: Duration) -> Self {
        Self::from_kind(Kind::Exponential { base, max, jitter: Jitter::None })
    }

    /// Exponential backoff with full jitter: uniform in `[0, computed]`.
    pub fn exponential_delay_full_jitter(base: Duration, max: Duration) -> Self {
        Self::from_kind(Kind::Exponential { base, max, jitter: Jitter::Full })
    }

    /// Exponential backoff with half jitter: uniform in
    /// `[computed / 2, computed]`.
    pub fn exponential_delay_half_jitter(base: Duration, max: Duration) -> Self {
        Self::from_kind(Kind::Exponential { base, max, jitter: Jitter::Half })
    }

    /// Replace the random source used by jittered variants.
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    fn from_kind(kind: Kind) -> Self {
        Self { kind, random: Arc::new(ThreadLocalRandom) }
    }

    /// Compute the delay before the given attempt.
    ///
    /// Attempts are 1-based; passing `attempt == 0` is an error.
    pub fn compute_delay(&self, attempt: u32) -> RetryResult<Duration> {
        if attempt == 0 {
            return Err(RetryError::invalid_argument("attempt must be greater than zero"));
        }

        let delay = match self.kind {
            Kind::Immediate => Duration::ZERO,
            Kind::Fixed { delay, jitter: false } => delay,
            Kind::Fixed { delay, jitter: true } => self.random_between(Duration::ZERO, delay),
            Kind::Exponential { base, max, jitter } => {
                if attempt == 1 {
                    Duration::ZERO
                } else {
                    let computed = exponential_delay_millis(base, max, attempt);
                    match jitter {
                        Jitter::None => computed,
                        Jitter::Full => self.random_between(Duration::ZERO, computed),
                        Jitter::Half => {
                            let half = Duration::from_millis(computed.as_millis() as u64 / 2);
                            self.random_between(half, computed)
                        }
                    }
                }
            }
        };
        Ok(delay)
    }

    /// Uniform random duration in `[lower, upper]`, millisecond granularity.
    fn random_between(&self, lower: Duration, upper: Duration) -> Duration {
        let lower_millis = lower.as_millis() as u64;
        let upper_millis = upper.as_millis() as u64;
        if upper_millis <= lower_millis {
            return lower;
        }
        let span = upper_millis - lower_millis;
        Duration::from_millis(lower_millis + self.random.next_inclusive(span))
    }
}

/// `min(max, base * 2^(attempt - 2))` with saturating arithmetic
fn exponential_delay_millis(base: Duration, max: Duration, attempt: u32) -> Duration {
    let base_millis = base.as_millis() as u64;
    let max_millis = max.as_millis() as u64;

    // Cap the exponent to prevent overflow on pathological attempt counts
    let exponent = (attempt - 2).min(MAX_BACKOFF_EXPONENT);
    let multiplier = 2_u64.saturating_pow(exponent);

    Duration::from_millis(base_millis.saturating_mul(multiplier).min(max_millis))
}

impl fmt::Debug for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffStrategy").field("kind", &self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for backoff delay computation.
    use super::*;
    use crate::random::FixedRandom;

    #[test]
    fn test_immediate_is_always_zero() {
        let strategy = BackoffStrategy::immediate();

        for attempt in 1..=10 {
            assert_eq!(strategy.compute_delay(attempt).unwrap(), Duration::ZERO);
        }
    }

    #[test]
    fn test_zero_attempt_is_rejected() {
        let strategy = BackoffStrategy::immediate();

        let err = strategy.compute_delay(0).unwrap_err();
        assert!(matches!(err, RetryError::InvalidArgument { .. }));
    }

    #[test]
    fn test_fixed_delay_ignores_attempt() {
        let delay = Duration::from_millis(250);
        let strategy = BackoffStrategy::fixed_delay(delay);

        assert_eq!(strategy.compute_delay(1).unwrap(), delay);
        assert_eq!(strategy.compute_delay(7).unwrap(), delay);
    }

    /// Validates the jittered fixed delay stays within `[0, delay]` and hits
    /// both bounds under a pinned random source.
    #[test]
    fn test_fixed_delay_jittered_bounds() {
        let delay = Duration::from_millis(100);

        let at_upper = BackoffStrategy::fixed_delay_jittered(delay)
            .with_random_source(Arc::new(FixedRandom::always(u64::MAX)));
        assert_eq!(at_upper.compute_delay(1).unwrap(), delay);

        let at_lower = BackoffStrategy::fixed_delay_jittered(delay)
            .with_random_source(Arc::new(FixedRandom::always(0)));
        assert_eq!(at_lower.compute_delay(1).unwrap(), Duration::ZERO);
    }

    /// Validates the exact non-jittered series: 0ms, 100ms, 200ms, 400ms,
    /// 800ms for base 100ms.
    #[test]
    fn test_exponential_without_jitter_series() {
        let strategy = BackoffStrategy::exponential_delay(
            Duration::from_millis(100),
            Duration::from_secs(20),
        );

        let expected = [0, 100, 200, 400, 800];
        for (attempt, millis) in (1..=5).zip(expected) {
            assert_eq!(strategy.compute_delay(attempt).unwrap(), Duration::from_millis(millis));
        }
    }

    #[test]
    fn test_exponential_caps_at_max_delay() {
        let strategy =
            BackoffStrategy::exponential_delay(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(strategy.compute_delay(10).unwrap(), Duration::from_secs(5));
        // Very large attempts must not overflow
        assert_eq!(strategy.compute_delay(u32::MAX).unwrap(), Duration::from_secs(5));
    }

    /// Full jitter's upper bound equals the non-jittered series, and its
    /// lower bound is zero.
    #[test]
    fn test_exponential_full_jitter_bounds() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(20);

        let at_upper = BackoffStrategy::exponential_delay_full_jitter(base, max)
            .with_random_source(Arc::new(FixedRandom::always(u64::MAX)));
        let reference = BackoffStrategy::exponential_delay(base, max);
        for attempt in 1..=6 {
            assert_eq!(
                at_upper.compute_delay(attempt).unwrap(),
                reference.compute_delay(attempt).unwrap()
            );
        }

        let at_lower = BackoffStrategy::exponential_delay_full_jitter(base, max)
            .with_random_source(Arc::new(FixedRandom::always(0)));
        assert_eq!(at_lower.compute_delay(4).unwrap(), Duration::ZERO);
    }

    /// Half jitter stays within `[computed / 2, computed]`.
    #[test]
    fn test_exponential_half_jitter_bounds() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(20);

        let at_lower = BackoffStrategy::exponential_delay_half_jitter(base, max)
            .with_random_source(Arc::new(FixedRandom::always(0)));
        // attempt 4 computes 400ms, so the floor is 200ms
        assert_eq!(at_lower.compute_delay(4).unwrap(), Duration::from_millis(200));

        let at_upper = BackoffStrategy::exponential_delay_half_jitter(base, max)
            .with_random_source(Arc::new(FixedRandom::always(u64::MAX)));
        assert_eq!(at_upper.compute_delay(4).unwrap(), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_adds_randomness() {
        let strategy = BackoffStrategy::exponential_delay_full_jitter(
            Duration::from_millis(100),
            Duration::from_secs(20),
        );

        let delays: Vec<Duration> =
            (0..16).map(|_| strategy.compute_delay(8).unwrap()).collect();

        let all_same = delays.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same);
    }
}
