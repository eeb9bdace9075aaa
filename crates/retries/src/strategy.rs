//! Retry strategy orchestration
//!
//! A [`RetryStrategy`] combines retry predicates, a throttling classifier,
//! an attempt limit, per-failure-class backoff strategies, and a per-scope
//! token bucket store into the three admission operations:
//! [`RetryStrategy::acquire_initial_token`],
//! [`RetryStrategy::refresh_retry_token`], and
//! [`RetryStrategy::record_success`].
//!
//! The strategy is built once, shared across threads (wrap it in an `Arc`),
//! and never sleeps: callers are responsible for waiting out the returned
//! delays.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::backoff::BackoffStrategy;
use crate::bucket::TokenBucketStore;
use crate::constants::{
    DEFAULT_ACQUIRE_COST, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_CAPACITY, DEFAULT_SUCCESS_INCREMENT, DEFAULT_THROTTLE_ACQUIRE_COST,
    DEFAULT_THROTTLING_BACKOFF_BASE, MAX_MAX_ATTEMPTS, MIN_MAX_ATTEMPTS,
};
use crate::error::{AcquisitionFailedReason, RetryError, RetryResult};
use crate::predicates::{
    default_retry_predicates, never_predicate, throttling_error_predicate, FailurePredicate,
};
use crate::token::RetryToken;

/// Response of [`RetryStrategy::acquire_initial_token`]
#[derive(Debug, Clone)]
pub struct AcquireInitialOutcome {
    token: RetryToken,
    delay: Duration,
}

impl AcquireInitialOutcome {
    /// Token granting permission for attempt 1.
    pub fn token(&self) -> &RetryToken {
        &self.token
    }

    /// Delay before the first attempt; always zero for this engine.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Response of [`RetryStrategy::refresh_retry_token`]
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    token: RetryToken,
    delay: Duration,
}

impl RefreshOutcome {
    /// Fresh token granting permission for the next attempt.
    pub fn token(&self) -> &RetryToken {
        &self.token
    }

    /// How long the caller must wait before the next attempt.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Response of [`RetryStrategy::record_success`]
#[derive(Debug, Clone)]
pub struct RecordSuccessOutcome {
    token: RetryToken,
    capacity_remaining: u32,
}

impl RecordSuccessOutcome {
    /// The completed token.
    pub fn token(&self) -> &RetryToken {
        &self.token
    }

    /// Capacity available in the scope's bucket after replenishment.
    pub fn capacity_remaining(&self) -> u32 {
        self.capacity_remaining
    }
}

/// Circuit-breaking retry admission strategy
///
/// Immutable once built; all three operations take `&self` and are safe
/// under unsynchronized concurrent invocation. The only shared mutable
/// state is the per-scope token buckets, which use atomic compare-and-swap
/// rather than a strategy-wide lock.
pub struct RetryStrategy {
    id: Uuid,
    max_attempts: u32,
    retry_predicates: Vec<FailurePredicate>,
    treat_as_throttling: FailurePredicate,
    backoff: BackoffStrategy,
    throttling_backoff: BackoffStrategy,
    acquire_cost: u32,
    throttle_acquire_cost: u32,
    success_increment: u32,
    circuit_breaker_enabled: bool,
    use_client_defaults: bool,
    buckets: TokenBucketStore,
}

impl RetryStrategy {
    /// Start building a strategy from the documented defaults.
    pub fn builder() -> RetryStrategyBuilder {
        RetryStrategyBuilder::new()
    }

    /// Acquire permission for the first attempt of a logical operation.
    ///
    /// Never charges the bucket and never delays the first attempt. Fails
    /// only on invalid input (empty scope).
    pub fn acquire_initial_token(&self, scope: &str) -> RetryResult<AcquireInitialOutcome> {
        if scope.is_empty() {
            return Err(RetryError::invalid_argument("scope must not be empty"));
        }

        let bucket = self.buckets.bucket_for_scope(scope);
        let token = RetryToken::initial(self.id, Arc::from(scope));
        debug!(
            scope,
            capacity = bucket.current_capacity(),
            max_capacity = bucket.max_capacity(),
            "attempt 1 token acquired (backoff: 0ms, cost: 0)"
        );
        Ok(AcquireInitialOutcome { token, delay: Duration::ZERO })
    }

    /// Exchange an active token plus a failure for permission to retry.
    ///
    /// On success the old token is completed and a fresh token for
    /// `attempt + 1` is returned together with the delay the caller must
    /// wait out. A [`RetryError::TokenAcquisitionFailed`] result is the
    /// engine's terminal "stop retrying" signal; the old token is completed
    /// on that path as well.
    pub fn refresh_retry_token(
        &self,
        token: &RetryToken,
        failure: &dyn std::error::Error,
        suggested_delay: Option<Duration>,
    ) -> RetryResult<RefreshOutcome> {
        token.ensure_issued_by(self.id)?;
        // The one-shot completion doubles as the reuse check: a token that
        // was already consumed fails here with InvalidTokenState.
        token.complete()?;

        // 1) Would the next attempt exceed the limit? Local decision, the
        //    bucket is not consulted.
        if token.attempt() + 1 > self.max_attempts {
            warn!(
                scope = token.scope(),
                attempt = token.attempt(),
                max_attempts = self.max_attempts,
                "request will not be retried, attempts exhausted"
            );
            return Err(RetryError::acquisition_failed(
                AcquisitionFailedReason::RetriesExhausted,
                token.clone(),
            ));
        }

        // 2) Does any predicate classify the failure as retryable?
        if !self.is_retryable(failure) {
            debug!(
                scope = token.scope(),
                attempt = token.attempt(),
                failure = %failure,
                "request will not be retried, failure is non-retryable"
            );
            return Err(RetryError::acquisition_failed(
                AcquisitionFailedReason::NonRetryable,
                token.clone(),
            ));
        }

        // 3) Throttling failures may carry a different cost and backoff.
        let throttling = (self.treat_as_throttling)(failure);

        // 4) Charge the scope's bucket. A failed acquire means the circuit
        //    is open: stop retrying even though the failure was retryable.
        let cost = self.cost_for(throttling);
        let bucket = self.buckets.bucket_for_scope(token.scope());
        let acquire = bucket.try_acquire(cost);
        if !acquire.succeeded() {
            warn!(
                scope = token.scope(),
                attempt = token.attempt(),
                cost = acquire.requested(),
                capacity = acquire.remaining(),
                max_capacity = acquire.max_capacity(),
                "request will not be retried to protect the caller and downstream service"
            );
            return Err(RetryError::acquisition_failed(
                AcquisitionFailedReason::CapacityExhausted,
                token.clone(),
            ));
        }

        // 5) Issue the successor token holding the acquired capacity.
        let refreshed = token.next(acquire.acquired());

        // 6) + 7) Backoff for the new attempt; a service-suggested delay can
        // only lengthen it, never shorten it.
        let backoff_strategy =
            if throttling { &self.throttling_backoff } else { &self.backoff };
        let backoff = backoff_strategy.compute_delay(refreshed.attempt())?;
        let delay = backoff.max(suggested_delay.unwrap_or(Duration::ZERO));

        debug!(
            scope = refreshed.scope(),
            attempt = refreshed.attempt(),
            backoff_ms = delay.as_millis() as u64,
            cost = acquire.acquired(),
            capacity = acquire.remaining(),
            max_capacity = acquire.max_capacity(),
            throttling,
            "retry token acquired"
        );
        Ok(RefreshOutcome { token: refreshed, delay })
    }

    /// Record that the attempt granted by `token` succeeded.
    ///
    /// Completes the token and restores `success_increment` units to the
    /// scope's bucket (clamped at the ceiling). This is the only path that
    /// restores capacity: sustained failures drain the bucket faster than
    /// sparse successes refill it.
    pub fn record_success(&self, token: &RetryToken) -> RetryResult<RecordSuccessOutcome> {
        token.ensure_issued_by(self.id)?;
        token.complete()?;

        let bucket = self.buckets.bucket_for_scope(token.scope());
        let release = bucket.release(self.success_increment);
        debug!(
            scope = token.scope(),
            attempt = token.attempt(),
            released = release.released(),
            capacity = release.remaining(),
            max_capacity = release.max_capacity(),
            "attempt succeeded"
        );
        Ok(RecordSuccessOutcome { token: token.clone(), capacity_remaining: release.remaining() })
    }

    /// Configured maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether built-in default predicates are merged with user predicates.
    pub fn use_client_defaults(&self) -> bool {
        self.use_client_defaults
    }

    fn is_retryable(&self, failure: &dyn std::error::Error) -> bool {
        self.retry_predicates.iter().any(|predicate| predicate(failure))
    }

    fn cost_for(&self, throttling: bool) -> u32 {
        if !self.circuit_breaker_enabled {
            return 0;
        }
        if throttling {
            self.throttle_acquire_cost
        } else {
            self.acquire_cost
        }
    }
}

impl fmt::Debug for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryStrategy")
            .field("id", &self.id)
            .field("max_attempts", &self.max_attempts)
            .field("retry_predicates", &self.retry_predicates.len())
            .field("backoff", &self.backoff)
            .field("throttling_backoff", &self.throttling_backoff)
            .field("acquire_cost", &self.acquire_cost)
            .field("throttle_acquire_cost", &self.throttle_acquire_cost)
            .field("success_increment", &self.success_increment)
            .field("circuit_breaker_enabled", &self.circuit_breaker_enabled)
            .field("use_client_defaults", &self.use_client_defaults)
            .finish()
    }
}

/// Builder for [`RetryStrategy`] with validated setters
pub struct RetryStrategyBuilder {
    max_attempts: u32,
    user_predicates: Vec<FailurePredicate>,
    treat_as_throttling: Option<FailurePredicate>,
    backoff: BackoffStrategy,
    throttling_backoff: BackoffStrategy,
    acquire_cost: u32,
    throttle_acquire_cost: u32,
    success_increment: u32,
    max_capacity: u32,
    circuit_breaker_enabled: bool,
    use_client_defaults: bool,
}

impl Default for RetryStrategyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryStrategyBuilder {
    /// Builder initialized with the documented defaults.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            user_predicates: Vec::new(),
            treat_as_throttling: None,
            backoff: BackoffStrategy::exponential_delay_full_jitter(
                DEFAULT_BACKOFF_BASE,
                DEFAULT_BACKOFF_MAX,
            ),
            throttling_backoff: BackoffStrategy::exponential_delay_full_jitter(
                DEFAULT_THROTTLING_BACKOFF_BASE,
                DEFAULT_BACKOFF_MAX,
            ),
            acquire_cost: DEFAULT_ACQUIRE_COST,
            throttle_acquire_cost: DEFAULT_THROTTLE_ACQUIRE_COST,
            success_increment: DEFAULT_SUCCESS_INCREMENT,
            max_capacity: DEFAULT_MAX_CAPACITY,
            circuit_breaker_enabled: true,
            use_client_defaults: true,
        }
    }

    /// Set the maximum number of attempts (initial attempt included).
    pub fn max_attempts(mut self, attempts: u32) -> RetryResult<Self> {
        if !(MIN_MAX_ATTEMPTS..=MAX_MAX_ATTEMPTS).contains(&attempts) {
            return Err(RetryError::invalid_argument(format!(
                "max_attempts must be between {MIN_MAX_ATTEMPTS} and {MAX_MAX_ATTEMPTS}, \
                 got {attempts}"
            )));
        }
        self.max_attempts = attempts;
        Ok(self)
    }

    /// Backoff strategy for non-throttling retryable failures.
    pub fn backoff_strategy(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Backoff strategy for throttling failures.
    pub fn throttling_backoff_strategy(mut self, backoff: BackoffStrategy) -> Self {
        self.throttling_backoff = backoff;
        self
    }

    /// Add a retry predicate. Predicates are additive: a failure is
    /// retryable if any predicate matches.
    pub fn retry_on_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn std::error::Error) -> bool + Send + Sync + 'static,
    {
        self.user_predicates.push(Arc::new(predicate));
        self
    }

    /// Classifier deciding whether a failure counts as throttling.
    pub fn treat_as_throttling<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn std::error::Error) -> bool + Send + Sync + 'static,
    {
        self.treat_as_throttling = Some(Arc::new(predicate));
        self
    }

    /// Merge the built-in default predicates with user predicates
    /// (default: true).
    pub fn use_client_defaults(mut self, enabled: bool) -> Self {
        self.use_client_defaults = enabled;
        self
    }

    /// Disable the token bucket circuit breaker: retries are charged zero
    /// cost and capacity never runs out.
    pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.circuit_breaker_enabled = enabled;
        self
    }

    /// Token bucket ceiling for every scope.
    pub fn max_capacity(mut self, capacity: u32) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Capacity units charged per non-throttling retry.
    pub fn acquire_cost(mut self, cost: u32) -> Self {
        self.acquire_cost = cost;
        self
    }

    /// Capacity units charged per throttling retry.
    pub fn throttle_acquire_cost(mut self, cost: u32) -> Self {
        self.throttle_acquire_cost = cost;
        self
    }

    /// Capacity units restored per recorded success.
    pub fn success_increment(mut self, increment: u32) -> Self {
        self.success_increment = increment;
        self
    }

    /// Build the immutable strategy.
    pub fn build(self) -> RetryStrategy {
        let mut retry_predicates = Vec::new();
        if self.use_client_defaults {
            retry_predicates.extend(default_retry_predicates());
        }
        retry_predicates.extend(self.user_predicates);

        let treat_as_throttling = self.treat_as_throttling.unwrap_or_else(|| {
            if self.use_client_defaults {
                throttling_error_predicate()
            } else {
                never_predicate()
            }
        });

        RetryStrategy {
            id: Uuid::new_v4(),
            max_attempts: self.max_attempts,
            retry_predicates,
            treat_as_throttling,
            backoff: self.backoff,
            throttling_backoff: self.throttling_backoff,
            acquire_cost: self.acquire_cost,
            throttle_acquire_cost: self.throttle_acquire_cost,
            success_increment: self.success_increment,
            circuit_breaker_enabled: self.circuit_breaker_enabled,
            use_client_defaults: self.use_client_defaults,
            buckets: TokenBucketStore::new(self.max_capacity),
        }
    }
}
