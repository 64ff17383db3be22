//! Request deduplication and display ranking.
//!
//! Request rows are created per submission, so one song can appear in several
//! rows. `merge_requests` folds rows sharing a merge key into one
//! [`AggregateRequest`]; `rank` orders aggregates for display. Both are pure
//! and deterministic: same input, same output, no I/O.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Request, RequestId, RequestRef, Requester};
use crate::util::fold_key;

/// Deduplicated view of every submission for one song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// Oldest constituent, or a local token for an unconfirmed submission
    pub reference: RequestRef,
    /// Constituent request rows, oldest first
    pub request_ids: Vec<RequestId>,
    pub key: String,
    pub title: String,
    pub artist: Option<String>,
    pub votes: i64,
    pub is_locked: bool,
    pub is_played: bool,
    pub created_at: DateTime<Utc>,
    pub requesters: Vec<Requester>,
}

impl AggregateRequest {
    fn from_request(request: &Request) -> Self {
        let mut aggregate = Self {
            reference: RequestRef::Confirmed(request.id),
            request_ids: vec![request.id],
            key: request.merge_key(),
            title: request.title.trim().to_string(),
            artist: request
                .artist
                .as_deref()
                .map(str::trim)
                .filter(|artist| !artist.is_empty())
                .map(str::to_string),
            votes: request.votes,
            is_locked: request.is_locked,
            is_played: request.is_played,
            created_at: request.created_at,
            requesters: Vec::with_capacity(request.requesters.len()),
        };
        merge_requesters(&mut aggregate.requesters, &request.requesters);
        aggregate
    }

    fn absorb(&mut self, request: &Request) {
        self.request_ids.push(request.id);
        self.votes = self.votes.saturating_add(request.votes);
        self.is_locked |= request.is_locked;
        self.is_played &= request.is_played;
        if request.created_at < self.created_at {
            self.created_at = request.created_at;
        }
        merge_requesters(&mut self.requesters, &request.requesters);
    }

    pub fn requester_count(&self) -> usize {
        self.requesters.len()
    }

    /// Votes and requester count are independent signals, summed.
    pub fn priority(&self) -> i64 {
        self.votes
            .saturating_add(i64::try_from(self.requester_count()).unwrap_or(i64::MAX))
    }

    /// Most recent requester timestamp, or `created_at` with no requesters.
    pub fn latest_activity(&self) -> DateTime<Utc> {
        self.requesters
            .iter()
            .map(|requester| requester.timestamp)
            .max()
            .unwrap_or(self.created_at)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.request_ids.contains(&id)
    }

    /// Collapse back into a single request row keyed by the primary id.
    pub fn to_request(&self) -> Option<Request> {
        let id = self.reference.confirmed()?;
        Some(Request {
            id,
            title: self.title.clone(),
            artist: self.artist.clone(),
            votes: self.votes,
            is_locked: self.is_locked,
            is_played: self.is_played,
            is_active: true,
            created_at: self.created_at,
            requesters: self.requesters.clone(),
        })
    }
}

/// Union `incoming` into `existing`.
///
/// A requester whose name is already present is skipped, unless it carries a
/// message: messages are kept as separate entries, once per distinct text.
pub fn merge_requesters(existing: &mut Vec<Requester>, incoming: &[Requester]) {
    for requester in incoming {
        let name = fold_key(&requester.name);
        let duplicate = match requester.message_text() {
            Some(message) => existing.iter().any(|current| {
                fold_key(&current.name) == name && current.message_text() == Some(message)
            }),
            None => existing
                .iter()
                .any(|current| fold_key(&current.name) == name),
        };
        if !duplicate {
            existing.push(requester.clone());
        }
    }
}

/// Fold request rows sharing a merge key into aggregates.
///
/// Rows are visited oldest first (ties by id) so constituent order, primary
/// id, and requester order do not depend on input order.
pub fn merge_requests(requests: &[Request]) -> Vec<AggregateRequest> {
    let mut ordered: Vec<&Request> = requests.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    let mut aggregates: Vec<AggregateRequest> = Vec::new();

    for request in ordered {
        match index_by_key.get(&request.merge_key()) {
            Some(&index) => aggregates[index].absorb(request),
            None => {
                let aggregate = AggregateRequest::from_request(request);
                index_by_key.insert(aggregate.key.clone(), aggregates.len());
                aggregates.push(aggregate);
            }
        }
    }

    aggregates
}

/// Display order: locked first, then priority, requester count, recency.
pub fn compare_for_display(a: &AggregateRequest, b: &AggregateRequest) -> Ordering {
    b.is_locked
        .cmp(&a.is_locked)
        .then_with(|| b.priority().cmp(&a.priority()))
        .then_with(|| b.requester_count().cmp(&a.requester_count()))
        .then_with(|| b.latest_activity().cmp(&a.latest_activity()))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.key.cmp(&b.key))
        .then_with(|| a.reference.cmp(&b.reference))
}

pub fn rank(mut aggregates: Vec<AggregateRequest>) -> Vec<AggregateRequest> {
    aggregates.sort_by(compare_for_display);
    aggregates
}

pub fn dedupe_and_rank(requests: &[Request]) -> Vec<AggregateRequest> {
    rank(merge_requests(requests))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::models::RequestSource;

    pub fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_714_593_600, 0).unwrap() + Duration::seconds(seconds)
    }

    pub fn requester(request_id: RequestId, name: &str, message: Option<&str>, seconds: i64) -> Requester {
        Requester {
            id: Uuid::new_v4(),
            request_id,
            name: name.to_string(),
            photo: None,
            message: message.map(str::to_string),
            timestamp: at(seconds),
            source: RequestSource::Web,
        }
    }

    pub fn request(title: &str, artist: &str, votes: i64, seconds: i64, names: &[&str]) -> Request {
        let id = RequestId::new();
        Request {
            id,
            title: title.to_string(),
            artist: Some(artist.to_string()),
            votes,
            is_locked: false,
            is_played: false,
            is_active: true,
            created_at: at(seconds),
            requesters: names
                .iter()
                .enumerate()
                .map(|(offset, name)| {
                    requester(id, name, None, seconds + i64::try_from(offset).unwrap_or(0))
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::fixtures::{at, request, requester};
    use super::*;

    fn titles(aggregates: &[AggregateRequest]) -> Vec<&str> {
        aggregates
            .iter()
            .map(|aggregate| aggregate.title.as_str())
            .collect()
    }

    #[test]
    fn rows_for_same_song_are_merged() {
        let first = request("Mr. Brightside", "The Killers", 2, 0, &["Ana"]);
        let mut second = request(" mr. brightside ", "the killers", 3, 10, &["Ben"]);
        second.is_locked = true;

        let merged = merge_requests(&[second.clone(), first.clone()]);
        assert_eq!(merged.len(), 1);

        let aggregate = &merged[0];
        assert_eq!(aggregate.reference, RequestRef::Confirmed(first.id));
        assert_eq!(aggregate.request_ids, vec![first.id, second.id]);
        assert_eq!(aggregate.votes, 5);
        assert!(aggregate.is_locked);
        assert_eq!(aggregate.created_at, at(0));
        assert_eq!(aggregate.title, "Mr. Brightside");
        assert_eq!(aggregate.requester_count(), 2);
    }

    #[test]
    fn missing_artist_merges_with_empty_artist() {
        let mut first = request("Intro", "", 0, 0, &["Ana"]);
        first.artist = None;
        let second = request("intro", "  ", 0, 5, &["Ben"]);

        assert_eq!(merge_requests(&[first, second]).len(), 1);
    }

    #[test]
    fn requesters_dedupe_by_name_but_keep_distinct_messages() {
        let first = request("Song", "Band", 0, 0, &["Ana"]);
        let mut second = request("Song", "Band", 0, 10, &["ana", "Ben"]);
        second
            .requesters
            .push(requester(second.id, "Ana", Some("for my sister"), 12));
        second
            .requesters
            .push(requester(second.id, "Ana", Some("happy birthday"), 13));
        second
            .requesters
            .push(requester(second.id, "ANA", Some("for my sister"), 14));

        let merged = merge_requests(&[first, second]);
        let entries: Vec<(String, Option<String>)> = merged[0]
            .requesters
            .iter()
            .map(|r| (r.name.clone(), r.message.clone()))
            .collect();

        assert_eq!(
            entries,
            vec![
                ("Ana".to_string(), None),
                ("Ben".to_string(), None),
                ("Ana".to_string(), Some("for my sister".to_string())),
                ("Ana".to_string(), Some("happy birthday".to_string())),
            ]
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let first = request("Song", "Band", 1, 0, &["Ana", "Ben"]);
        let mut second = request("song", "band", 2, 10, &["Ben", "Cy"]);
        second
            .requesters
            .push(requester(second.id, "Ana", Some("again!"), 11));
        let other = request("Other", "Band", 4, 20, &[]);

        let once = merge_requests(&[first, second, other]);
        let rows: Vec<Request> = once.iter().filter_map(AggregateRequest::to_request).collect();
        let twice = merge_requests(&rows);

        assert_eq!(once, twice);
    }

    #[test]
    fn requester_count_breaks_priority_tie() {
        let a = request("A", "Band", 2, 0, &["Ana"]);
        let b = request("B", "Band", 0, 10, &["Ben", "Cy", "Dee"]);

        let ranked = dedupe_and_rank(&[a, b]);
        assert_eq!(ranked[0].priority(), 3);
        assert_eq!(ranked[1].priority(), 3);
        assert_eq!(titles(&ranked), vec!["B", "A"]);
    }

    #[test]
    fn extreme_vote_counts_saturate() {
        let merged = merge_requests(&[
            request("Song", "Band", i64::MAX, 0, &["Ana"]),
            request("song", "band", 7, 10, &["Ben"]),
        ]);
        assert_eq!(merged[0].votes, i64::MAX);
        assert_eq!(merged[0].priority(), i64::MAX);
    }

    #[test]
    fn locked_aggregate_ranks_first_regardless_of_priority() {
        let popular = request("Popular", "Band", 50, 0, &["Ana", "Ben"]);
        let mut locked = request("Locked", "Band", 0, 10, &[]);
        locked.is_locked = true;

        let ranked = dedupe_and_rank(&[popular, locked]);
        assert_eq!(titles(&ranked), vec!["Locked", "Popular"]);
    }

    #[test]
    fn recency_breaks_remaining_ties() {
        let older = request("Older", "Band", 1, 0, &["Ana"]);
        let newer = request("Newer", "Band", 1, 30, &["Ben"]);
        let no_requesters_old = request("Quiet", "Band", 2, 5, &[]);
        let no_requesters_new = request("Quieter", "Band", 2, 50, &[]);

        let ranked = dedupe_and_rank(&[older, newer, no_requesters_old, no_requesters_new]);
        assert_eq!(titles(&ranked), vec!["Newer", "Older", "Quieter", "Quiet"]);
    }

    #[test]
    fn latest_activity_falls_back_to_created_at() {
        let aggregate = &merge_requests(&[request("Song", "Band", 0, 42, &[])])[0];
        assert_eq!(aggregate.latest_activity(), at(42));
    }

    #[test]
    fn ranking_is_deterministic() {
        let rows = vec![
            request("A", "Band", 1, 0, &["Ana"]),
            request("B", "Band", 1, 0, &["Ben"]),
            request("C", "Band", 0, 0, &["Cy", "Dee"]),
            request("a", "band", 0, 3, &[]),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let first = dedupe_and_rank(&rows);
        for _ in 0..5 {
            assert_eq!(dedupe_and_rank(&rows), first);
        }
        assert_eq!(dedupe_and_rank(&reversed), first);
    }
}
