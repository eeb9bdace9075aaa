//! Token buckets bounding outstanding retry cost per scope
//!
//! The bucket is the circuit breaker: once downstream failures drain a
//! scope's capacity, `try_acquire` fails for every operation sharing that
//! scope, shedding retry load across the whole client during an outage.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Result of a capacity acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOutcome {
    requested: u32,
    acquired: u32,
    remaining: u32,
    max_capacity: u32,
}

impl AcquireOutcome {
    /// Whether the requested capacity was acquired.
    pub fn succeeded(&self) -> bool {
        self.acquired == self.requested
    }

    /// Capacity units that were requested.
    pub fn requested(&self) -> u32 {
        self.requested
    }

    /// Capacity units actually acquired (zero on failure).
    pub fn acquired(&self) -> u32 {
        self.acquired
    }

    /// Capacity remaining in the bucket after the attempt.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Configured capacity ceiling of the bucket.
    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }
}

/// Result of returning capacity to the bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    released: u32,
    remaining: u32,
    max_capacity: u32,
}

impl ReleaseOutcome {
    /// Capacity units handed back (before clamping).
    pub fn released(&self) -> u32 {
        self.released
    }

    /// Capacity in the bucket after the release.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Configured capacity ceiling of the bucket.
    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }
}

/// Thread-safe retry capacity pool for one scope
///
/// Capacity only moves through [`TokenBucket::try_acquire`] and
/// [`TokenBucket::release`]; there is no time-based refill. The invariant
/// `0 <= capacity <= max_capacity` holds under arbitrary concurrency.
#[derive(Debug)]
pub struct TokenBucket {
    max_capacity: u32,
    capacity: AtomicU32,
}

impl TokenBucket {
    /// Create a full bucket with the given ceiling.
    pub fn new(max_capacity: u32) -> Self {
        Self { max_capacity, capacity: AtomicU32::new(max_capacity) }
    }

    /// Atomically withdraw `cost` units, or fail without mutating state.
    pub fn try_acquire(&self, cost: u32) -> AcquireOutcome {
        if cost == 0 {
            return AcquireOutcome {
                requested: 0,
                acquired: 0,
                remaining: self.current_capacity(),
                max_capacity: self.max_capacity,
            };
        }

        loop {
            let current = self.capacity.load(Ordering::Acquire);
            if current < cost {
                return AcquireOutcome {
                    requested: cost,
                    acquired: 0,
                    remaining: current,
                    max_capacity: self.max_capacity,
                };
            }
            match self.capacity.compare_exchange_weak(
                current,
                current - cost,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return AcquireOutcome {
                        requested: cost,
                        acquired: cost,
                        remaining: current - cost,
                        max_capacity: self.max_capacity,
                    };
                }
                Err(_) => continue, // Retry on concurrent modification
            }
        }
    }

    /// Atomically return `amount` units, clamped at the ceiling.
    pub fn release(&self, amount: u32) -> ReleaseOutcome {
        loop {
            let current = self.capacity.load(Ordering::Acquire);
            let replenished = current.saturating_add(amount).min(self.max_capacity);

            if current == replenished {
                return ReleaseOutcome {
                    released: amount,
                    remaining: current,
                    max_capacity: self.max_capacity,
                };
            }
            match self.capacity.compare_exchange_weak(
                current,
                replenished,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return ReleaseOutcome {
                        released: amount,
                        remaining: replenished,
                        max_capacity: self.max_capacity,
                    };
                }
                Err(_) => continue,
            }
        }
    }

    /// Currently available capacity.
    pub fn current_capacity(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }

    /// Configured capacity ceiling.
    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }
}

/// Lazily populated map of scope key to its token bucket
///
/// One bucket per scope, created on first use and retained for the store's
/// lifetime; buckets are never reset.
#[derive(Debug)]
pub struct TokenBucketStore {
    max_capacity: u32,
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl TokenBucketStore {
    /// Create a store whose buckets all share the given ceiling.
    pub fn new(max_capacity: u32) -> Self {
        Self { max_capacity, buckets: DashMap::new() }
    }

    /// Bucket for the given scope, created full on first access.
    pub fn bucket_for_scope(&self, scope: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(scope) {
            return Arc::clone(bucket.value());
        }
        let entry = self
            .buckets
            .entry(scope.to_owned())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.max_capacity)));
        Arc::clone(entry.value())
    }
}
