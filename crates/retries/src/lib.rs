//! Retry admission control for Backstop clients.
//!
//! This crate decides, for a sequence of attempts at a single logical
//! operation, whether an attempt may proceed, how long the caller must wait
//! before it proceeds, and when the sequence must stop. It performs no I/O
//! and never sleeps: the caller waits out the returned delays, synchronously
//! or on a timer.
//!
//! The three entry points are [`RetryStrategy::acquire_initial_token`]
//! (once per logical operation), [`RetryStrategy::refresh_retry_token`]
//! (after every failed attempt), and [`RetryStrategy::record_success`]
//! (after a successful attempt). All operations sharing a *scope* draw from
//! one token bucket, so sustained downstream failures open the circuit for
//! the whole client, not just the failing operation.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use backstop_retries::{BackoffStrategy, RetryStrategy};
//!
//! # fn main() -> Result<(), backstop_retries::RetryError> {
//! let strategy = RetryStrategy::builder()
//!     .max_attempts(4)?
//!     .backoff_strategy(BackoffStrategy::exponential_delay_full_jitter(
//!         Duration::from_millis(100),
//!         Duration::from_secs(20),
//!     ))
//!     .build();
//!
//! let initial = strategy.acquire_initial_token("storage:get")?;
//! // ... attempt fails ...
//! let failure = std::io::Error::other("connection reset by peer");
//! let refreshed = strategy.refresh_retry_token(initial.token(), &failure, None)?;
//! assert_eq!(refreshed.token().attempt(), 2);
//! // ... caller waits out refreshed.delay(), attempt succeeds ...
//! strategy.record_success(refreshed.token())?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod bucket;
pub mod constants;
pub mod error;
pub mod predicates;
pub mod random;
pub mod strategy;
pub mod token;

pub use backoff::BackoffStrategy;
pub use bucket::{AcquireOutcome, ReleaseOutcome, TokenBucket, TokenBucketStore};
pub use error::{AcquisitionFailedReason, RetryError, RetryResult};
pub use predicates::{
    never_predicate, throttling_error_predicate, transient_error_predicate, FailurePredicate,
};
pub use random::{FixedRandom, RandomSource, ThreadLocalRandom};
pub use strategy::{
    AcquireInitialOutcome, RecordSuccessOutcome, RefreshOutcome, RetryStrategy,
    RetryStrategyBuilder,
};
pub use token::{RetryToken, TokenState};
