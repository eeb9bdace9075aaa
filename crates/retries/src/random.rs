//! Randomness abstraction for testability
//!
//! Jittered backoff strategies draw from an injected [`RandomSource`] rather
//! than reading global randomness directly, so tests can supply a
//! deterministic source and assert exact delay bounds.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// Source of uniform random values for jittered backoff
pub trait RandomSource: Send + Sync {
    /// Returns a uniformly distributed value in `[0, upper]`, inclusive.
    fn next_inclusive(&self, upper: u64) -> u64;
}

/// Production random source backed by the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLocalRandom;

impl RandomSource for ThreadLocalRandom {
    fn next_inclusive(&self, upper: u64) -> u64 {
        rand::thread_rng().gen_range(0..=upper)
    }
}

/// Deterministic random source for tests
///
/// Cycles through a fixed sequence of values, clamping each to the requested
/// upper bound. `FixedRandom::always(u64::MAX)` pins jitter to its upper
/// bound, `FixedRandom::always(0)` to its lower bound.
#[derive(Debug)]
pub struct FixedRandom {
    values: Vec<u64>,
    cursor: AtomicUsize,
}

impl FixedRandom {
    /// Create a source that cycles through `values`.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty.
    pub fn sequence(values: Vec<u64>) -> Self {
        assert!(!values.is_empty(), "FixedRandom requires at least one value");
        Self { values, cursor: AtomicUsize::new(0) }
    }

    /// Create a source that always yields `value` (clamped to the bound).
    pub fn always(value: u64) -> Self {
        Self::sequence(vec![value])
    }
}

impl RandomSource for FixedRandom {
    fn next_inclusive(&self, upper: u64) -> u64 {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[index].min(upper)
    }
}
