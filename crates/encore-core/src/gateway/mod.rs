//! Remote gateway: the seam between the sync engine and the managed backend.
//!
//! The engine talks to the backend through [`RemoteGateway`] only. Rows cross
//! the seam as JSON; the typed helpers at the bottom of this module decode
//! them into models. Multi-row invariants (one vote per voter, one locked
//! request) are enforced server-side by the procedures in [`Procedure`].

mod memory;
mod supabase;

use std::fmt;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::models::{NewRequest, QueueSettings, Request, RequestId, Song};

pub use memory::{FailurePoint, MemoryBackend};
pub use supabase::SupabaseGateway;

/// Backend tables the engine reads or watches.
///
/// `Requests` rows are returned with their requesters embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Requests,
    Requesters,
    Songs,
    QueueSettings,
    UserVotes,
}

impl Collection {
    pub const ALL: [Self; 5] = [
        Self::Requests,
        Self::Requesters,
        Self::Songs,
        Self::QueueSettings,
        Self::UserVotes,
    ];

    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Requesters => "requesters",
            Self::Songs => "songs",
            Self::QueueSettings => "queue_settings",
            Self::UserVotes => "user_votes",
        }
    }

    /// Whether a change to this collection alters the request queue.
    pub const fn affects_queue(self) -> bool {
        matches!(self, Self::Requests | Self::Requesters | Self::UserVotes)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-change notification from the backend's change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub const fn new(collection: Collection, kind: ChangeKind) -> Self {
        Self { collection, kind }
    }
}

/// Equality filter on a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

/// Server-side procedures that keep multi-row invariants atomic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Procedure {
    /// Increment votes unless this voter already voted; returns a boolean.
    AddVote {
        request_id: RequestId,
        voter_id: String,
    },
    /// Clear every other lock and lock this request in one transaction.
    LockRequest { request_id: RequestId },
    UnlockRequest { request_id: RequestId },
}

impl Procedure {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddVote { .. } => "add_vote",
            Self::LockRequest { .. } => "lock_request",
            Self::UnlockRequest { .. } => "unlock_request",
        }
    }

    pub fn arguments(&self) -> Value {
        match self {
            Self::AddVote {
                request_id,
                voter_id,
            } => json!({ "p_request_id": request_id, "p_user_id": voter_id }),
            Self::LockRequest { request_id } | Self::UnlockRequest { request_id } => {
                json!({ "p_request_id": request_id })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Live change feed. Dropping `events` ends delivery.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Operations the sync engine needs from the backend.
pub trait RemoteGateway: Send + Sync + 'static {
    fn fetch_collection(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Insert one row and return it as stored, with server-assigned fields.
    fn insert(&self, collection: Collection, row: Value)
        -> impl Future<Output = Result<Value>> + Send;

    /// Merge `patch` into every row matching `filters`; returns the rows as stored.
    fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Value,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    fn invoke(&self, procedure: &Procedure) -> impl Future<Output = Result<Value>> + Send;

    fn subscribe(
        &self,
        collections: &[Collection],
    ) -> impl Future<Output = Result<Subscription>> + Send;

    fn unsubscribe(&self, id: SubscriptionId) -> impl Future<Output = ()> + Send;
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Error::from))
        .collect()
}

/// Unplayed, active requests with their requesters.
pub async fn fetch_requests<G: RemoteGateway>(gateway: &G) -> Result<Vec<Request>> {
    let filters = [Filter::eq("is_played", false), Filter::eq("is_active", true)];
    let rows = gateway
        .fetch_collection(Collection::Requests, &filters)
        .await?;
    decode_rows(rows)
}

pub async fn fetch_songs<G: RemoteGateway>(gateway: &G) -> Result<Vec<Song>> {
    let rows = gateway.fetch_collection(Collection::Songs, &[]).await?;
    decode_rows(rows)
}

/// First settings row, or defaults when the table is empty.
pub async fn fetch_settings<G: RemoteGateway>(gateway: &G) -> Result<QueueSettings> {
    let rows = gateway
        .fetch_collection(Collection::QueueSettings, &[])
        .await?;
    match rows.into_iter().next() {
        Some(row) => Ok(serde_json::from_value(row)?),
        None => Ok(QueueSettings::default()),
    }
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: RequestId,
}

/// Create one request row plus its first requester. Returns the new id.
///
/// If the requester insert fails the request row is deactivated before the
/// error is returned, so no client lists it.
pub async fn create_request<G: RemoteGateway>(gateway: &G, request: &NewRequest) -> Result<RequestId> {
    let row = gateway
        .insert(
            Collection::Requests,
            json!({
                "title": request.title,
                "artist": request.artist,
                "votes": 0,
                "is_locked": false,
                "is_played": false,
                "is_active": true,
            }),
        )
        .await?;
    let InsertedRow { id } = serde_json::from_value(row)?;

    let requester = json!({
        "request_id": id,
        "name": request.requester_name,
        "photo": request.photo,
        "message": request.message,
        "source": request.source,
    });
    if let Err(error) = gateway.insert(Collection::Requesters, requester).await {
        tracing::warn!(request_id = %id, "Requester insert failed, withdrawing request: {}", error);
        withdraw_request(gateway, id).await;
        return Err(error);
    }

    Ok(id)
}

async fn withdraw_request<G: RemoteGateway>(gateway: &G, id: RequestId) {
    let filters = [Filter::eq("id", id.to_string())];
    match gateway
        .update(Collection::Requests, &filters, json!({ "is_active": false }))
        .await
    {
        Ok(rows) if !rows.is_empty() => {}
        Ok(_) => tracing::warn!(request_id = %id, "Orphaned request row not found"),
        Err(error) => {
            tracing::error!(request_id = %id, "Could not withdraw orphaned request: {}", error);
        }
    }
}

/// Interpret the `add_vote` result: `false` means this voter already voted.
pub fn interpret_vote(result: &Value) -> Result<()> {
    match result {
        Value::Bool(true) => Ok(()),
        Value::Bool(false) => Err(Error::Conflict(
            "You have already voted for this request".to_string(),
        )),
        other => Err(Error::Api {
            status: 500,
            message: format!("unexpected add_vote result: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn filter_matches_by_column_value() {
        let filter = Filter::eq("is_played", false);
        assert!(filter.matches(&json!({ "is_played": false })));
        assert!(!filter.matches(&json!({ "is_played": true })));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn procedure_arguments_use_prefixed_names() {
        let request_id = RequestId::new();
        let procedure = Procedure::AddVote {
            request_id,
            voter_id: "voter-1".to_string(),
        };
        assert_eq!(procedure.name(), "add_vote");
        assert_eq!(
            procedure.arguments(),
            json!({ "p_request_id": request_id.to_string(), "p_user_id": "voter-1" })
        );
        assert_eq!(
            Procedure::LockRequest { request_id }.arguments(),
            json!({ "p_request_id": request_id.to_string() })
        );
    }

    #[test]
    fn vote_result_false_is_conflict() {
        assert!(interpret_vote(&json!(true)).is_ok());
        assert_eq!(
            interpret_vote(&json!(false)).unwrap_err().class(),
            crate::ErrorClass::Conflict
        );
        assert!(interpret_vote(&json!(null)).is_err());
    }

    #[test]
    fn only_queue_collections_affect_queue() {
        assert!(Collection::Requests.affects_queue());
        assert!(Collection::UserVotes.affects_queue());
        assert!(!Collection::Songs.affects_queue());
        assert!(!Collection::QueueSettings.affects_queue());
    }
}
