// Error types for the retry admission-control engine
use std::fmt;

use thiserror::Error;

use crate::token::RetryToken;

/// Why a retry token could not be acquired.
///
/// All three reasons surface through the single
/// [`RetryError::TokenAcquisitionFailed`] condition: callers that only want
/// "should I keep retrying?" match on the variant, diagnostic consumers
/// inspect the reason and the embedded token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionFailedReason {
    /// The next attempt would exceed the configured maximum.
    RetriesExhausted,
    /// The failure matched no retry predicate.
    NonRetryable,
    /// The scope's token bucket had insufficient capacity (circuit open).
    CapacityExhausted,
}

impl fmt::Display for AcquisitionFailedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted => write!(f, "retries have been exhausted"),
            Self::NonRetryable => write!(f, "failure is not retryable"),
            Self::CapacityExhausted => write!(f, "retry capacity is exhausted"),
        }
    }
}

/// Errors surfaced by the retry admission-control engine
#[derive(Debug, Error)]
pub enum RetryError {
    /// The request must not be retried. This is the engine's "stop" signal;
    /// it is never retried internally.
    #[error("request will not be retried: {reason}")]
    TokenAcquisitionFailed {
        reason: AcquisitionFailedReason,
        /// The token in its terminal state, for diagnostics.
        token: RetryToken,
    },

    /// A token was reused after completion or was issued by another strategy.
    /// Programmer error; never swallow this.
    #[error("invalid retry token state: {message}")]
    InvalidTokenState { message: String },

    /// Malformed input (empty scope, zero attempt, invalid configuration).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl RetryError {
    pub(crate) fn acquisition_failed(reason: AcquisitionFailedReason, token: RetryToken) -> Self {
        Self::TokenAcquisitionFailed { reason, token }
    }

    pub(crate) fn invalid_token_state(message: impl Into<String>) -> Self {
        Self::InvalidTokenState { message: message.into() }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Returns the acquisition failure reason, if this is the "stop
    /// retrying" condition.
    pub fn acquisition_failure_reason(&self) -> Option<AcquisitionFailedReason> {
        match self {
            Self::TokenAcquisitionFailed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for retry admission operations
pub type RetryResult<T> = Result<T, RetryError>;
