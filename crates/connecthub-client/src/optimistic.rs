//! Optimistic mutation support.
//!
//! The pattern: capture the prior state, apply the delta locally so the UI
//! reflects the action immediately, issue the remote mutation, and restore
//! the captured state if the mutation fails. [`InFlight`] guards against
//! double-submit so a counter delta is never applied twice for one user
//! action.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

use connecthub_gateway::GatewayError;

/// Tracks keys with a mutation in flight. The triggering control stays
/// disabled until [`InFlight::finish`] runs.
#[derive(Debug, Default)]
pub struct InFlight<K: Eq + Hash> {
    keys: HashSet<K>,
}

impl<K: Eq + Hash> InFlight<K> {
    pub fn new() -> Self {
        Self {
            keys: HashSet::new(),
        }
    }

    /// Claim the key. Returns `false` when a mutation for it is already
    /// in flight, in which case the caller must drop the action.
    pub fn try_begin(&mut self, key: K) -> bool {
        self.keys.insert(key)
    }

    pub fn finish(&mut self, key: &K) {
        self.keys.remove(key);
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.keys.contains(key)
    }
}

/// Apply `delta` to `slot`, run the mutation, and restore the captured
/// prior value if the mutation fails.
///
/// The prior value is cloned before the delta so the revert is exact, not
/// a reset to a default.
pub async fn with_rollback<T, F, Fut>(
    slot: &mut T,
    delta: F,
    mutation: Fut,
) -> Result<(), GatewayError>
where
    T: Clone,
    F: FnOnce(&mut T),
    Fut: Future<Output = Result<(), GatewayError>>,
{
    let prior = slot.clone();
    delta(slot);

    match mutation.await {
        Ok(()) => Ok(()),
        Err(err) => {
            *slot = prior;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> Result<(), GatewayError> {
        Ok(())
    }

    async fn fail() -> Result<(), GatewayError> {
        Err(GatewayError::Api {
            status: 500,
            message: "boom".into(),
        })
    }

    #[tokio::test]
    async fn successful_mutation_keeps_delta() {
        // Joining a community with member_count = 5 shows 6 immediately.
        let mut member_count: i64 = 5;
        with_rollback(&mut member_count, |c| *c += 1, ok())
            .await
            .unwrap();
        assert_eq!(member_count, 6);
    }

    #[tokio::test]
    async fn failed_mutation_restores_exact_prior_value() {
        let mut member_count: i64 = 5;
        let err = with_rollback(&mut member_count, |c| *c += 1, fail()).await;
        assert!(err.is_err());
        assert_eq!(member_count, 5);
    }

    #[tokio::test]
    async fn rollback_restores_structured_state() {
        let mut view = (false, 5i64); // (is_member, member_count)
        let _ = with_rollback(
            &mut view,
            |v| {
                v.0 = true;
                v.1 += 1;
            },
            fail(),
        )
        .await;
        assert_eq!(view, (false, 5));
    }

    #[test]
    fn in_flight_blocks_double_submit() {
        let mut guard: InFlight<u32> = InFlight::new();
        assert!(guard.try_begin(7));
        assert!(!guard.try_begin(7));
        assert!(guard.is_pending(&7));
        guard.finish(&7);
        assert!(guard.try_begin(7));
    }
}
