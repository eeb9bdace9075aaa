//! Failure classification predicates
//!
//! The engine never inspects error types directly; callers hand it a failure
//! value and the strategy evaluates predicates over it. The built-in client
//! defaults classify common transient and throttling failures by message
//! heuristics, and user predicates are additive on top.

use std::sync::Arc;

/// Predicate over a failure value, deciding retryability or throttling
pub type FailurePredicate = Arc<dyn Fn(&dyn std::error::Error) -> bool + Send + Sync>;

/// Predicate matching transient network and server failures.
///
/// Part of the client defaults merged in when `use_client_defaults` is
/// enabled on the strategy builder.
pub fn transient_error_predicate() -> FailurePredicate {
    Arc::new(|err| is_transient_error(err))
}

/// Predicate matching throttling / rate-limit failures.
///
/// Used both as a default retry predicate and as the default
/// `treat_as_throttling` classifier.
pub fn throttling_error_predicate() -> FailurePredicate {
    Arc::new(|err| is_throttling_error(err))
}

/// Predicate that never matches. Default throttling classifier when the
/// caller supplies none and client defaults are disabled.
pub fn never_predicate() -> FailurePredicate {
    Arc::new(|_| false)
}

/// Client-default retry predicates, in evaluation order.
pub(crate) fn default_retry_predicates() -> Vec<FailurePredicate> {
    vec![transient_error_predicate(), throttling_error_predicate()]
}

/// Check if error looks like a transient network or server failure
fn is_transient_error(err: &dyn std::error::Error) -> bool {
    let err_str = err.to_string().to_lowercase();
    err_str.contains("connection")
        || err_str.contains("timeout")
        || err_str.contains("timed out")
        || err_str.contains("network")
        || err_str.contains("dns")
        || err_str.contains("refused")
        || err_str.contains("reset")
        || err_str.contains("broken pipe")
        || err_str.contains("unreachable")
        || err_str.contains("500")
        || err_str.contains("502")
        || err_str.contains("503")
        || err_str.contains("504")
        || err_str.contains("service unavailable")
        || err_str.contains("internal server error")
}

/// Check if error is throttling related
fn is_throttling_error(err: &dyn std::error::Error) -> bool {
    let err_str = err.to_string().to_lowercase();
    err_str.contains("rate limit")
        || err_str.contains("too many requests")
        || err_str.contains("429")
        || err_str.contains("throttl")
        || err_str.contains("slow down")
        || err_str.contains("quota exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(message: &str) -> std::io::Error {
        std::io::Error::other(message.to_owned())
    }

    #[test]
    fn test_transient_predicate_matches_network_errors() {
        let predicate = transient_error_predicate();

        assert!(predicate(&error("connection reset by peer")));
        assert!(predicate(&error("request timed out")));
        assert!(predicate(&error("HTTP 503 Service Unavailable")));
    }

    #[test]
    fn test_transient_predicate_ignores_client_errors() {
        let predicate = transient_error_predicate();

        assert!(!predicate(&error("validation failed")));
        assert!(!predicate(&error("HTTP 404 Not Found")));
    }

    #[test]
    fn test_throttling_predicate_matches_rate_limits() {
        let predicate = throttling_error_predicate();

        assert!(predicate(&error("HTTP 429 Too Many Requests")));
        assert!(predicate(&error("ThrottlingException")));
        assert!(!predicate(&error("connection reset by peer")));
    }

    #[test]
    fn test_never_predicate_matches_nothing() {
        let predicate = never_predicate();

        assert!(!predicate(&error("HTTP 429")));
        assert!(!predicate(&error("connection reset")));
    }
}
