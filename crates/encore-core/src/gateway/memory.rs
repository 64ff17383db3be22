//! In-process backend with the same procedure semantics as the managed one.
//!
//! Used by the CLI demo and by tests. Vote uniqueness and lock exclusivity
//! are applied under one mutex, which gives the atomicity the real backend
//! gets from its stored procedures. Failures can be injected per call site.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    ChangeEvent, ChangeKind, Collection, Filter, Procedure, RemoteGateway, Subscription,
    SubscriptionId,
};
use crate::error::{Error, Result};
use crate::models::{QueueSettings, Request, RequestId, RequestSource, Requester, Song};

/// Call site a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Fetch,
    Insert,
    Update,
    Invoke,
    Subscribe,
}

#[derive(Debug)]
struct Subscriber {
    collections: Vec<Collection>,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Debug, Default)]
struct MemoryState {
    requests: Vec<Request>,
    songs: Vec<Song>,
    settings: Option<QueueSettings>,
    votes: HashSet<(RequestId, String)>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    next_subscription: u64,
    failures: HashMap<FailurePoint, VecDeque<u16>>,
    insert_failures: HashMap<Collection, VecDeque<u16>>,
    calls: HashMap<FailurePoint, u32>,
    offline: bool,
    latency: Duration,
}

impl MemoryState {
    fn notify(&mut self, collection: Collection, kind: ChangeKind) {
        let event = ChangeEvent::new(collection, kind);
        self.subscribers.retain(|_, subscriber| {
            !subscriber.collections.contains(&collection) || subscriber.sender.send(event).is_ok()
        });
    }

    fn take_insert_failure(&mut self, collection: Collection) -> Result<()> {
        match self
            .insert_failures
            .get_mut(&collection)
            .and_then(VecDeque::pop_front)
        {
            Some(status) => Err(Error::Api {
                status,
                message: format!("injected insert failure on {collection}"),
            }),
            None => Ok(()),
        }
    }

    fn request_mut(&mut self, id: RequestId) -> Result<&mut Request> {
        self.requests
            .iter_mut()
            .find(|request| request.id == id)
            .ok_or_else(|| Error::Api {
                status: 404,
                message: format!("request {id} not found"),
            })
    }
}

/// Shared in-memory backend. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Deserialize)]
struct RequestRow {
    title: String,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    votes: i64,
    #[serde(default)]
    is_locked: bool,
    #[serde(default)]
    is_played: bool,
}

#[derive(Debug, Deserialize)]
struct RequesterRow {
    request_id: RequestId,
    name: String,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    source: RequestSource,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a request row as-is, requesters included.
    pub fn seed_request(&self, request: Request) {
        let mut state = self.lock();
        state.requests.push(request);
        state.notify(Collection::Requests, ChangeKind::Insert);
    }

    pub fn seed_songs(&self, songs: Vec<Song>) {
        let mut state = self.lock();
        state.songs = songs;
        state.notify(Collection::Songs, ChangeKind::Insert);
    }

    pub fn set_settings(&self, settings: QueueSettings) {
        let mut state = self.lock();
        state.settings = Some(settings);
        state.notify(Collection::QueueSettings, ChangeKind::Update);
    }

    /// Edit a request row outside the engine, as another client would.
    pub fn update_request(&self, id: RequestId, edit: impl FnOnce(&mut Request)) -> bool {
        let mut state = self.lock();
        let Ok(request) = state.request_mut(id) else {
            return false;
        };
        edit(request);
        state.notify(Collection::Requests, ChangeKind::Update);
        true
    }

    pub fn delete_request(&self, id: RequestId) -> bool {
        let mut state = self.lock();
        let before = state.requests.len();
        state.requests.retain(|request| request.id != id);
        let removed = state.requests.len() != before;
        if removed {
            state.notify(Collection::Requests, ChangeKind::Delete);
        }
        removed
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub fn request(&self, id: RequestId) -> Option<Request> {
        self.lock()
            .requests
            .iter()
            .find(|request| request.id == id)
            .cloned()
    }

    pub fn locked_ids(&self) -> Vec<RequestId> {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.is_locked)
            .map(|request| request.id)
            .collect()
    }

    /// Fail the next `times` calls at `point` with the given HTTP status.
    pub fn fail_next(&self, point: FailurePoint, status: u16, times: usize) {
        let mut state = self.lock();
        let queue = state.failures.entry(point).or_default();
        queue.extend(std::iter::repeat(status).take(times));
    }

    /// Fail the next insert into `collection` only; other inserts go through.
    pub fn fail_next_insert(&self, collection: Collection, status: u16) {
        self.lock()
            .insert_failures
            .entry(collection)
            .or_default()
            .push_back(status);
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay every call, for exercising in-flight behavior.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn calls(&self, point: FailurePoint) -> u32 {
        self.lock().calls.get(&point).copied().unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    async fn enter(&self, point: FailurePoint) -> Result<()> {
        let latency = {
            let mut state = self.lock();
            *state.calls.entry(point).or_default() += 1;
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if state.offline {
            return Err(Error::Disconnected("backend unreachable".to_string()));
        }
        if let Some(status) = state
            .failures
            .get_mut(&point)
            .and_then(VecDeque::pop_front)
        {
            return Err(Error::Api {
                status,
                message: format!("injected {point:?} failure"),
            });
        }
        Ok(())
    }
}

impl RemoteGateway for MemoryBackend {
    async fn fetch_collection(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Value>> {
        self.enter(FailurePoint::Fetch).await?;
        let state = self.lock();

        let rows = match collection {
            Collection::Requests => state
                .requests
                .iter()
                .map(serde_json::to_value)
                .collect::<serde_json::Result<Vec<_>>>()?,
            Collection::Requesters => state
                .requests
                .iter()
                .flat_map(|request| request.requesters.iter())
                .map(serde_json::to_value)
                .collect::<serde_json::Result<Vec<_>>>()?,
            Collection::Songs => state
                .songs
                .iter()
                .map(serde_json::to_value)
                .collect::<serde_json::Result<Vec<_>>>()?,
            Collection::QueueSettings => state
                .settings
                .iter()
                .map(serde_json::to_value)
                .collect::<serde_json::Result<Vec<_>>>()?,
            Collection::UserVotes => state
                .votes
                .iter()
                .map(|(request_id, voter_id)| json!({ "request_id": request_id, "user_id": voter_id }))
                .collect(),
        };

        Ok(rows
            .into_iter()
            .filter(|row| filters.iter().all(|filter| filter.matches(row)))
            .collect())
    }

    async fn insert(&self, collection: Collection, row: Value) -> Result<Value> {
        self.enter(FailurePoint::Insert).await?;
        let mut state = self.lock();
        state.take_insert_failure(collection)?;

        match collection {
            Collection::Requests => {
                let row: RequestRow = serde_json::from_value(row)?;
                let request = Request {
                    id: RequestId::new(),
                    title: row.title,
                    artist: row.artist,
                    votes: row.votes,
                    is_locked: row.is_locked,
                    is_played: row.is_played,
                    is_active: true,
                    created_at: Utc::now(),
                    requesters: Vec::new(),
                };
                let stored = serde_json::to_value(&request)?;
                state.requests.push(request);
                state.notify(Collection::Requests, ChangeKind::Insert);
                Ok(stored)
            }
            Collection::Requesters => {
                let row: RequesterRow = serde_json::from_value(row)?;
                let requester = Requester {
                    id: Uuid::new_v4(),
                    request_id: row.request_id,
                    name: row.name,
                    photo: row.photo,
                    message: row.message,
                    timestamp: Utc::now(),
                    source: row.source,
                };
                let stored = serde_json::to_value(&requester)?;
                state
                    .request_mut(row.request_id)
                    .map_err(|_| Error::Api {
                        status: 409,
                        message: "requester references a missing request".to_string(),
                    })?
                    .requesters
                    .push(requester);
                state.notify(Collection::Requesters, ChangeKind::Insert);
                Ok(stored)
            }
            other => Err(Error::Api {
                status: 405,
                message: format!("{other} is read-only"),
            }),
        }
    }

    async fn update(&self, collection: Collection, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        self.enter(FailurePoint::Update).await?;
        let Value::Object(patch) = patch else {
            return Err(Error::Validation("update patch must be a JSON object".to_string()));
        };
        if collection != Collection::Requests {
            return Err(Error::Api {
                status: 405,
                message: format!("{collection} does not accept updates"),
            });
        }

        let mut state = self.lock();
        let mut updated = Vec::new();
        for request in &mut state.requests {
            let mut row = serde_json::to_value(&*request)?;
            if !filters.iter().all(|filter| filter.matches(&row)) {
                continue;
            }
            if let Value::Object(fields) = &mut row {
                fields.extend(patch.clone());
            }
            *request = serde_json::from_value(row.clone())?;
            updated.push(row);
        }
        if !updated.is_empty() {
            state.notify(Collection::Requests, ChangeKind::Update);
        }
        Ok(updated)
    }

    async fn invoke(&self, procedure: &Procedure) -> Result<Value> {
        self.enter(FailurePoint::Invoke).await?;
        let mut state = self.lock();

        match procedure {
            Procedure::AddVote {
                request_id,
                voter_id,
            } => {
                state.request_mut(*request_id)?;
                if !state.votes.insert((*request_id, voter_id.clone())) {
                    return Ok(Value::Bool(false));
                }
                state.request_mut(*request_id)?.votes += 1;
                state.notify(Collection::UserVotes, ChangeKind::Insert);
                state.notify(Collection::Requests, ChangeKind::Update);
                Ok(Value::Bool(true))
            }
            Procedure::LockRequest { request_id } => {
                state.request_mut(*request_id)?;
                for request in &mut state.requests {
                    request.is_locked = request.id == *request_id;
                }
                state.notify(Collection::Requests, ChangeKind::Update);
                Ok(Value::Null)
            }
            Procedure::UnlockRequest { request_id } => {
                state.request_mut(*request_id)?.is_locked = false;
                state.notify(Collection::Requests, ChangeKind::Update);
                Ok(Value::Null)
            }
        }
    }

    async fn subscribe(&self, collections: &[Collection]) -> Result<Subscription> {
        self.enter(FailurePoint::Subscribe).await?;
        let mut state = self.lock();

        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        let (sender, events) = mpsc::unbounded_channel();
        state.subscribers.insert(
            id,
            Subscriber {
                collections: collections.to_vec(),
                sender,
            },
        );
        tracing::debug!(subscription = %id, "memory backend subscription opened");
        Ok(Subscription { id, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscribers.remove(&id);
    }
}
