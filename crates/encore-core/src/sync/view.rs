//! Display snapshot composition.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::StaleDataWarning;
use crate::lock::enforce_single_lock;
use crate::models::Request;
use crate::optimistic::OptimisticState;
use crate::ranking::{merge_requests, rank, AggregateRequest};
use crate::state::ConnectionState;

/// Everything a presentation layer needs to render the queue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub requests: Vec<AggregateRequest>,
    pub connection: ConnectionState,
    /// Authoritative data is past its TTL or the last refresh failed
    pub stale: bool,
    pub warning: Option<StaleDataWarning>,
}

impl QueueSnapshot {
    pub fn locked(&self) -> Option<&AggregateRequest> {
        self.requests.iter().find(|request| request.is_locked)
    }
}

/// Authoritative rows, deduplicated, lock-enforced, overlaid, ranked.
pub fn compose_view(
    authoritative: &[Request],
    optimistic: &OptimisticState,
    now: Instant,
) -> Vec<AggregateRequest> {
    let mut view = merge_requests(authoritative);
    enforce_single_lock(&mut view);
    optimistic.apply(&mut view, now);
    rank(view)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::optimistic::MutationKind;
    use crate::ranking::fixtures::request;

    #[tokio::test(start_paused = true)]
    async fn speculative_lock_moves_item_to_top() {
        let popular = request("Popular", "Band", 9, 0, &["Ana"]);
        let quiet = request("Quiet", "Band", 0, 10, &[]);
        let mut optimistic =
            OptimisticState::new(Duration::from_millis(1_500), Duration::from_secs(15));

        optimistic.begin_lock(quiet.id, MutationKind::Lock, None, Instant::now());
        let view = compose_view(&[popular, quiet.clone()], &optimistic, Instant::now());

        assert!(view[0].contains(quiet.id));
        assert!(view[0].is_locked);
        assert!(!view[1].is_locked);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_locked_entry() {
        let mut locked = request("Locked", "Band", 0, 0, &[]);
        locked.is_locked = true;
        let optimistic = OptimisticState::new(Duration::from_millis(1_500), Duration::from_secs(15));

        let snapshot = QueueSnapshot {
            requests: compose_view(&[locked.clone()], &optimistic, Instant::now()),
            ..Default::default()
        };
        assert!(snapshot.locked().unwrap().contains(locked.id));
    }
}
