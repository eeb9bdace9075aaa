//! Retry tokens: permission handles for one attempt in a retry sequence
//!
//! A token is issued by [`crate::RetryStrategy::acquire_initial_token`],
//! replaced on every refresh, and completed exactly once. Clones share the
//! same interior state, so completing any clone invalidates them all.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{RetryError, RetryResult};

/// Lifecycle state of a retry token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// The token grants permission for one attempt.
    Active,
    /// The token was consumed by a refresh or a recorded success.
    Completed,
}

const STATE_ACTIVE: u8 = 0;
const STATE_COMPLETED: u8 = 1;

/// Permission to perform (or retry) one attempt of a logical operation
#[derive(Clone)]
pub struct RetryToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    id: Uuid,
    strategy_id: Uuid,
    scope: Arc<str>,
    attempt: u32,
    capacity_held: u32,
    state: AtomicU8,
}

impl RetryToken {
    /// Token for the first attempt of an operation. Holds no bucket capacity.
    pub(crate) fn initial(strategy_id: Uuid, scope: Arc<str>) -> Self {
        Self::new(strategy_id, scope, 1, 0)
    }

    /// Successor token for the next attempt, holding the capacity that was
    /// just acquired from the bucket.
    pub(crate) fn next(&self, capacity_held: u32) -> Self {
        Self::new(
            self.inner.strategy_id,
            Arc::clone(&self.inner.scope),
            self.inner.attempt + 1,
            capacity_held,
        )
    }

    fn new(strategy_id: Uuid, scope: Arc<str>, attempt: u32, capacity_held: u32) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: Uuid::new_v4(),
                strategy_id,
                scope,
                attempt,
                capacity_held,
                state: AtomicU8::new(STATE_ACTIVE),
            }),
        }
    }

    /// Transition `Active -> Completed`. The compare-exchange guarantees the
    /// transition happens exactly once even under concurrent misuse.
    pub(crate) fn complete(&self) -> RetryResult<()> {
        self.inner
            .state
            .compare_exchange(STATE_ACTIVE, STATE_COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                RetryError::invalid_token_state(format!(
                    "token {} for scope '{}' was already completed",
                    self.inner.id, self.inner.scope
                ))
            })
    }

    /// Reject tokens that were not issued by the given strategy.
    pub(crate) fn ensure_issued_by(&self, strategy_id: Uuid) -> RetryResult<()> {
        if self.inner.strategy_id != strategy_id {
            return Err(RetryError::invalid_token_state(format!(
                "token {} was not issued by this retry strategy",
                self.inner.id
            )));
        }
        Ok(())
    }

    /// Unique identity of this token.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The failure-isolation scope this token belongs to.
    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    /// 1-based attempt number this token grants permission for.
    pub fn attempt(&self) -> u32 {
        self.inner.attempt
    }

    /// Bucket capacity currently checked out by this token.
    pub fn capacity_held(&self) -> u32 {
        self.inner.capacity_held
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TokenState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_ACTIVE => TokenState::Active,
            _ => TokenState::Completed,
        }
    }

    /// Whether the token still grants permission for an attempt.
    pub fn is_active(&self) -> bool {
        self.state() == TokenState::Active
    }
}

impl fmt::Debug for RetryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryToken")
            .field("id", &self.inner.id)
            .field("scope", &self.inner.scope)
            .field("attempt", &self.inner.attempt)
            .field("capacity_held", &self.inner.capacity_held)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(attempt: u32) -> RetryToken {
        RetryToken::new(Uuid::new_v4(), Arc::from("scope"), attempt, 0)
    }

    #[test]
    fn test_initial_token_starts_active_at_attempt_one() {
        let token = RetryToken::initial(Uuid::new_v4(), Arc::from("db:query"));

        assert_eq!(token.attempt(), 1);
        assert_eq!(token.capacity_held(), 0);
        assert_eq!(token.scope(), "db:query");
        assert!(token.is_active());
    }

    #[test]
    fn test_next_token_increments_attempt_and_holds_capacity() {
        let first = token(1);
        let second = first.next(5);

        assert_eq!(second.attempt(), 2);
        assert_eq!(second.capacity_held(), 5);
        assert_eq!(second.scope(), first.scope());
        assert_ne!(second.id(), first.id());
        assert!(second.is_active());
    }

    #[test]
    fn test_complete_transitions_exactly_once() {
        let token = token(1);

        token.complete().expect("first completion succeeds");
        assert_eq!(token.state(), TokenState::Completed);

        let err = token.complete().expect_err("second completion is rejected");
        assert!(matches!(err, RetryError::InvalidTokenState { .. }));
    }

    #[test]
    fn test_clones_share_state() {
        let token = token(1);
        let clone = token.clone();

        token.complete().unwrap();
        assert!(!clone.is_active());
        assert!(clone.complete().is_err());
    }

    #[test]
    fn test_foreign_strategy_is_rejected() {
        let token = token(1);

        assert!(token.ensure_issued_by(Uuid::new_v4()).is_err());
    }
}
