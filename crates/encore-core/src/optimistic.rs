//! Speculative local state layered over the authoritative queue.
//!
//! Votes are tracked per target request as an increment over the
//! authoritative count, lock changes in a single slot, and submissions as
//! placeholder creations until the backend assigns an id.
//! Every entry ends in one of three ways: reverted on failure, cleared once
//! the authoritative view agrees (or the grace window after confirmation
//! elapses), or expired after `max_age` with no resolution.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::models::{LocalToken, NewRequest, Request, RequestId, RequestRef, Requester};
use crate::ranking::{merge_requesters, merge_requests, AggregateRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Vote,
    Lock,
    Unlock,
}

/// What the presentation layer showed before the speculative change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousValue {
    /// Authoritative votes of the target row when the vote began
    Votes(i64),
    /// Request displayed as locked, if any
    Locked(Option<RequestId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    /// Remote call still in flight
    Pending,
    /// Remote call succeeded; speculative value held for the grace window
    Confirmed { at: Instant },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub target_id: RequestId,
    pub kind: MutationKind,
    pub applied_at: Instant,
    pub previous_value: PreviousValue,
    pub status: MutationStatus,
    /// Votes added on top of the authoritative count while live
    pub delta: i64,
    superseded: Option<Box<PendingMutation>>,
}

impl PendingMutation {
    fn new(
        target_id: RequestId,
        kind: MutationKind,
        previous_value: PreviousValue,
        now: Instant,
        superseded: Option<Self>,
    ) -> Self {
        let delta = match kind {
            MutationKind::Vote => superseded
                .as_ref()
                .map_or(0, |mutation| mutation.delta)
                .saturating_add(1),
            MutationKind::Lock | MutationKind::Unlock => 0,
        };
        Self {
            target_id,
            kind,
            applied_at: now,
            previous_value,
            status: MutationStatus::Pending,
            delta,
            superseded: superseded.map(Box::new),
        }
    }

    fn is_live(&self, now: Instant, grace: Duration, max_age: Duration) -> bool {
        match self.status {
            MutationStatus::Pending => now.duration_since(self.applied_at) < max_age,
            MutationStatus::Confirmed { at } => now.duration_since(at) < grace,
        }
    }

    fn matches(&self, rows: &[Request], view: &[AggregateRequest]) -> bool {
        let target = view.iter().find(|aggregate| aggregate.contains(self.target_id));
        match (self.kind, self.previous_value) {
            (MutationKind::Vote, PreviousValue::Votes(baseline)) => rows
                .iter()
                .find(|row| row.id == self.target_id)
                .is_some_and(|row| row.votes >= baseline.saturating_add(self.delta)),
            (MutationKind::Vote, PreviousValue::Locked(_)) => false,
            (MutationKind::Lock, _) => {
                target.is_some_and(|aggregate| aggregate.is_locked)
                    && view.iter().filter(|aggregate| aggregate.is_locked).count() == 1
            }
            (MutationKind::Unlock, _) => !target.is_some_and(|aggregate| aggregate.is_locked),
        }
    }
}

/// A submission shown before the backend confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreation {
    pub token: LocalToken,
    pub request: NewRequest,
    pub applied_at: Instant,
    pub submitted_at: DateTime<Utc>,
    pub confirmed_id: Option<RequestId>,
}

impl PendingCreation {
    fn reference(&self) -> RequestRef {
        self.confirmed_id
            .map_or(RequestRef::PendingCreation(self.token), RequestRef::Confirmed)
    }

    fn requester(&self) -> Requester {
        Requester {
            id: self.token.as_uuid(),
            request_id: self
                .confirmed_id
                .unwrap_or_else(|| RequestId::from_uuid(self.token.as_uuid())),
            name: self.request.requester_name.clone(),
            photo: self.request.photo.clone(),
            message: self.request.message.clone(),
            timestamp: self.submitted_at,
            source: self.request.source,
        }
    }

    fn placeholder(&self) -> AggregateRequest {
        AggregateRequest {
            reference: self.reference(),
            request_ids: self.confirmed_id.into_iter().collect(),
            key: self.request.merge_key(),
            title: self.request.title.clone(),
            artist: Some(self.request.artist.clone()),
            votes: 0,
            is_locked: false,
            is_played: false,
            created_at: self.submitted_at,
            requesters: vec![self.requester()],
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub cleared: usize,
    pub expired: Vec<(RequestId, MutationKind)>,
    pub expired_creations: Vec<LocalToken>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.cleared > 0 || !self.expired.is_empty() || !self.expired_creations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OptimisticState {
    votes: HashMap<RequestId, PendingMutation>,
    lock_slot: Option<PendingMutation>,
    creations: Vec<PendingCreation>,
    grace: Duration,
    max_age: Duration,
}

impl OptimisticState {
    pub fn new(grace: Duration, max_age: Duration) -> Self {
        Self {
            votes: HashMap::new(),
            lock_slot: None,
            creations: Vec::new(),
            grace,
            max_age,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty() && self.lock_slot.is_none() && self.creations.is_empty()
    }

    pub const fn lock_intent(&self) -> Option<&PendingMutation> {
        self.lock_slot.as_ref()
    }

    pub fn creations(&self) -> &[PendingCreation] {
        &self.creations
    }

    /// Add one vote to `target` until the vote resolves.
    ///
    /// `row_votes` is the authoritative count of the target row; the vote is
    /// settled once a snapshot shows that row above it.
    pub fn begin_vote(&mut self, target: RequestId, row_votes: i64, now: Instant) {
        let (grace, max_age) = (self.grace, self.max_age);
        let superseded = self
            .votes
            .remove(&target)
            .filter(|mutation| mutation.is_live(now, grace, max_age));
        self.votes.insert(
            target,
            PendingMutation::new(
                target,
                MutationKind::Vote,
                PreviousValue::Votes(row_votes),
                now,
                superseded,
            ),
        );
    }

    /// Claim the lock slot for a lock or unlock of `target`.
    pub fn begin_lock(
        &mut self,
        target: RequestId,
        kind: MutationKind,
        displayed_locked: Option<RequestId>,
        now: Instant,
    ) {
        let superseded = self.lock_slot.take();
        self.lock_slot = Some(PendingMutation::new(
            target,
            kind,
            PreviousValue::Locked(displayed_locked),
            now,
            superseded,
        ));
    }

    fn slot_mut(&mut self, target: RequestId, kind: MutationKind) -> Option<&mut Option<PendingMutation>> {
        match kind {
            MutationKind::Vote => None,
            MutationKind::Lock | MutationKind::Unlock => self
                .lock_slot
                .as_ref()
                .is_some_and(|mutation| mutation.target_id == target && mutation.kind == kind)
                .then_some(&mut self.lock_slot),
        }
    }

    /// Remote call succeeded: start the grace window.
    pub fn confirm(&mut self, target: RequestId, kind: MutationKind, now: Instant) -> bool {
        let mutation = match kind {
            MutationKind::Vote => self.votes.get_mut(&target),
            MutationKind::Lock | MutationKind::Unlock => {
                self.slot_mut(target, kind).and_then(Option::as_mut)
            }
        };
        let Some(mutation) = mutation else {
            return false;
        };
        mutation.status = MutationStatus::Confirmed { at: now };
        mutation.superseded = None;
        true
    }

    /// Remote call failed: drop the speculation, restoring whatever it replaced.
    pub fn revert(&mut self, target: RequestId, kind: MutationKind, now: Instant) -> Option<PreviousValue> {
        let (grace, max_age) = (self.grace, self.max_age);
        let restore = |superseded: Option<Box<PendingMutation>>| {
            superseded
                .map(|mutation| *mutation)
                .filter(|mutation| mutation.is_live(now, grace, max_age))
        };

        match kind {
            MutationKind::Vote => {
                let mutation = self.votes.remove(&target)?;
                if let Some(previous) = restore(mutation.superseded) {
                    self.votes.insert(target, previous);
                }
                Some(mutation.previous_value)
            }
            MutationKind::Lock | MutationKind::Unlock => {
                let slot = self.slot_mut(target, kind)?;
                let mutation = slot.take()?;
                *slot = restore(mutation.superseded);
                Some(mutation.previous_value)
            }
        }
    }

    pub fn begin_creation(&mut self, request: NewRequest, now: Instant) -> LocalToken {
        let token = LocalToken::new();
        self.creations.push(PendingCreation {
            token,
            request,
            applied_at: now,
            submitted_at: Utc::now(),
            confirmed_id: None,
        });
        token
    }

    pub fn confirm_creation(&mut self, token: LocalToken, id: RequestId) -> bool {
        self.creations
            .iter_mut()
            .find(|creation| creation.token == token)
            .map(|creation| creation.confirmed_id = Some(id))
            .is_some()
    }

    pub fn revert_creation(&mut self, token: LocalToken) -> bool {
        let before = self.creations.len();
        self.creations.retain(|creation| creation.token != token);
        self.creations.len() != before
    }

    fn creation_is_live(&self, creation: &PendingCreation, now: Instant) -> bool {
        now.duration_since(creation.applied_at) < self.max_age
    }

    /// Overlay live speculation onto an authoritative view.
    pub fn apply(&self, view: &mut Vec<AggregateRequest>, now: Instant) {
        for creation in &self.creations {
            if !self.creation_is_live(creation, now) {
                continue;
            }
            if let Some(id) = creation.confirmed_id {
                if view.iter().any(|aggregate| aggregate.contains(id)) {
                    continue;
                }
            }

            let key = creation.request.merge_key();
            match view.iter_mut().find(|aggregate| aggregate.key == key) {
                Some(aggregate) => {
                    merge_requesters(&mut aggregate.requesters, &[creation.requester()]);
                    aggregate.request_ids.extend(creation.confirmed_id);
                }
                None => view.push(creation.placeholder()),
            }
        }

        for mutation in self
            .votes
            .values()
            .filter(|mutation| mutation.is_live(now, self.grace, self.max_age))
        {
            if let Some(aggregate) = view
                .iter_mut()
                .find(|aggregate| aggregate.contains(mutation.target_id))
            {
                aggregate.votes = aggregate.votes.saturating_add(mutation.delta);
            }
        }

        let Some(intent) = self
            .lock_slot
            .as_ref()
            .filter(|mutation| mutation.is_live(now, self.grace, self.max_age))
        else {
            return;
        };
        match intent.kind {
            MutationKind::Lock => {
                for aggregate in view.iter_mut() {
                    aggregate.is_locked = aggregate.contains(intent.target_id);
                }
            }
            MutationKind::Unlock => {
                for aggregate in view.iter_mut() {
                    if aggregate.contains(intent.target_id) {
                        aggregate.is_locked = false;
                    }
                }
            }
            MutationKind::Vote => {}
        }
    }

    /// Drop entries the authoritative rows have caught up with, or that outlived their window.
    pub fn reconcile(&mut self, rows: &[Request], now: Instant) -> ReconcileReport {
        let (grace, max_age) = (self.grace, self.max_age);
        let authoritative = merge_requests(rows);
        let mut report = ReconcileReport::default();

        let settle = |mutation: &PendingMutation, report: &mut ReconcileReport| -> bool {
            match mutation.status {
                MutationStatus::Pending if !mutation.is_live(now, grace, max_age) => {
                    tracing::warn!(
                        target_id = %mutation.target_id,
                        kind = ?mutation.kind,
                        "Pending mutation expired without resolution"
                    );
                    report.expired.push((mutation.target_id, mutation.kind));
                    false
                }
                MutationStatus::Pending => true,
                MutationStatus::Confirmed { .. } => {
                    let keep = mutation.is_live(now, grace, max_age)
                        && !mutation.matches(rows, &authoritative);
                    if !keep {
                        report.cleared += 1;
                    }
                    keep
                }
            }
        };

        self.votes.retain(|_, mutation| settle(mutation, &mut report));
        if let Some(intent) = self.lock_slot.take() {
            if settle(&intent, &mut report) {
                self.lock_slot = Some(intent);
            }
        }

        self.creations.retain(|creation| {
            if let Some(id) = creation.confirmed_id {
                if authoritative.iter().any(|aggregate| aggregate.contains(id)) {
                    report.cleared += 1;
                    return false;
                }
            }
            if now.duration_since(creation.applied_at) >= max_age {
                tracing::warn!(token = %creation.token, "Pending submission expired");
                report.expired_creations.push(creation.token);
                return false;
            }
            true
        });

        report
    }
}
