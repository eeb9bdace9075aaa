// Default constants for the retry admission-control engine
use std::time::Duration;

/// Default maximum number of attempts (one initial attempt plus two retries)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default token bucket capacity per scope
pub const DEFAULT_MAX_CAPACITY: u32 = 500;

/// Default capacity units charged per retry attempt
pub const DEFAULT_ACQUIRE_COST: u32 = 5;

/// Default capacity units charged when the failure is classified as
/// throttling
pub const DEFAULT_THROTTLE_ACQUIRE_COST: u32 = 5;

/// Default capacity units restored when an attempt succeeds
pub const DEFAULT_SUCCESS_INCREMENT: u32 = 1;

/// Default base delay for exponential backoff
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Default maximum backoff delay cap
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(20);

/// Default base delay for backoff after throttling failures
pub const DEFAULT_THROTTLING_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Minimum allowed max_attempts value
pub const MIN_MAX_ATTEMPTS: u32 = 1;

/// Maximum allowed max_attempts value
pub const MAX_MAX_ATTEMPTS: u32 = 100;
