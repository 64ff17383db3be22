//! Single-lock invariant.
//!
//! The backend's `lock_request` procedure clears every other lock in the same
//! transaction, so the client never writes lock flags row by row. Between
//! that write and the next consistent read the authoritative snapshot can
//! still show more than one locked request; `enforce_single_lock` resolves
//! that on display without touching backend state.

use crate::gateway::Procedure;
use crate::models::{Request, RequestId, RequestRef};
use crate::optimistic::MutationKind;
use crate::ranking::AggregateRequest;

/// Remote calls needed to change the lock state of one aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockPlan {
    Lock(RequestId),
    /// Every constituent currently locked on the backend
    Unlock(Vec<RequestId>),
}

impl LockPlan {
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Lock(_) => MutationKind::Lock,
            Self::Unlock(_) => MutationKind::Unlock,
        }
    }

    pub fn procedures(&self) -> Vec<Procedure> {
        match self {
            Self::Lock(request_id) => vec![Procedure::LockRequest {
                request_id: *request_id,
            }],
            Self::Unlock(request_ids) => request_ids
                .iter()
                .map(|request_id| Procedure::UnlockRequest {
                    request_id: *request_id,
                })
                .collect(),
        }
    }
}

/// Keep at most one aggregate locked: the one with the most recent activity.
///
/// Returns the reference of the aggregate left locked, if any.
pub fn enforce_single_lock(aggregates: &mut [AggregateRequest]) -> Option<RequestRef> {
    let chosen = aggregates
        .iter()
        .filter(|aggregate| aggregate.is_locked)
        .min_by(|a, b| {
            b.latest_activity()
                .cmp(&a.latest_activity())
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.key.cmp(&b.key))
        })
        .map(|aggregate| aggregate.reference)?;

    let locked = aggregates.iter().filter(|aggregate| aggregate.is_locked).count();
    if locked > 1 {
        tracing::warn!(
            locked,
            chosen = %chosen,
            "Multiple locked requests in snapshot, displaying one"
        );
        for aggregate in aggregates.iter_mut() {
            aggregate.is_locked = aggregate.reference == chosen;
        }
    }

    Some(chosen)
}

/// Plan a toggle from the displayed state of `aggregate`.
pub fn plan_toggle(aggregate: &AggregateRequest, authoritative: &[Request]) -> Option<LockPlan> {
    if aggregate.is_locked {
        Some(plan_unlock(aggregate, authoritative))
    } else {
        aggregate.reference.confirmed().map(LockPlan::Lock)
    }
}

/// Unlock every backend-locked constituent, or the primary id when the lock
/// is only speculative.
pub fn plan_unlock(aggregate: &AggregateRequest, authoritative: &[Request]) -> LockPlan {
    let locked: Vec<RequestId> = authoritative
        .iter()
        .filter(|request| request.is_locked && aggregate.contains(request.id))
        .map(|request| request.id)
        .collect();

    if locked.is_empty() {
        LockPlan::Unlock(aggregate.reference.confirmed().into_iter().collect())
    } else {
        LockPlan::Unlock(locked)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ranking::fixtures::request;
    use crate::ranking::merge_requests;

    #[test]
    fn single_lock_is_left_alone() {
        let mut locked = request("One", "Band", 0, 0, &["Ana"]);
        locked.is_locked = true;
        let mut view = merge_requests(&[locked.clone(), request("Two", "Band", 0, 5, &[])]);

        assert_eq!(
            enforce_single_lock(&mut view),
            Some(RequestRef::Confirmed(locked.id))
        );
        assert_eq!(view.iter().filter(|a| a.is_locked).count(), 1);
    }

    #[test]
    fn multiple_locks_resolve_to_most_recent_activity() {
        let mut older = request("One", "Band", 0, 0, &["Ana"]);
        older.is_locked = true;
        let mut newer = request("Two", "Band", 0, 60, &["Ben"]);
        newer.is_locked = true;
        let mut view = merge_requests(&[older, newer.clone()]);

        let chosen = enforce_single_lock(&mut view);
        assert_eq!(chosen, Some(RequestRef::Confirmed(newer.id)));
        let locked: Vec<&AggregateRequest> = view.iter().filter(|a| a.is_locked).collect();
        assert_eq!(locked.len(), 1);
        assert!(locked[0].contains(newer.id));
    }

    #[test]
    fn no_locks_yields_none() {
        let mut view = merge_requests(&[request("One", "Band", 0, 0, &[])]);
        assert_eq!(enforce_single_lock(&mut view), None);
    }

    #[test]
    fn toggle_on_unlocked_aggregate_locks_primary_id() {
        let first = request("Song", "Band", 0, 0, &["Ana"]);
        let second = request("song", "band", 0, 10, &["Ben"]);
        let rows = vec![first.clone(), second];
        let view = merge_requests(&rows);

        assert_eq!(plan_toggle(&view[0], &rows), Some(LockPlan::Lock(first.id)));
    }

    #[test]
    fn toggle_on_locked_aggregate_unlocks_locked_constituents() {
        let first = request("Song", "Band", 0, 0, &["Ana"]);
        let mut second = request("song", "band", 0, 10, &["Ben"]);
        second.is_locked = true;
        let rows = vec![first, second.clone()];
        let view = merge_requests(&rows);

        let plan = plan_toggle(&view[0], &rows).unwrap();
        assert_eq!(plan, LockPlan::Unlock(vec![second.id]));
        assert_eq!(
            plan.procedures(),
            vec![Procedure::UnlockRequest {
                request_id: second.id
            }]
        );
    }
}
