//! PostgREST gateway for a Supabase project.
//!
//! Reads and writes go through `/rest/v1/<table>`, procedures through
//! `/rest/v1/rpc/<name>`. The change feed polls each watched table and diffs
//! row fingerprints, emitting one event per change kind per poll. A poller
//! stops on `unsubscribe` or once its feed receiver is dropped.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{
    ChangeEvent, ChangeKind, Collection, Filter, Procedure, RemoteGateway, Subscription,
    SubscriptionId,
};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::util::compact_text;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
struct RestClient {
    config: BackendConfig,
    client: Client,
}

impl RestClient {
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.anon_key);
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(parse_api_error(status, &body));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn select(&self, table: &str, columns: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        let mut query = vec![("select".to_string(), columns.to_string())];
        query.extend(filter_query(filters));

        let url = format!("{}/{table}", self.config.rest_url());
        let body = self.send(self.client.get(url).query(&query)).await?;
        expect_rows(table, body)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Gateway backed by a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseGateway {
    rest: RestClient,
    poll_interval: Duration,
    next_subscription: Arc<AtomicU64>,
    pollers: Arc<Mutex<HashMap<SubscriptionId, JoinHandle<()>>>>,
}

impl SupabaseGateway {
    pub fn new(config: BackendConfig, poll_interval: Duration) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            rest: RestClient {
                config,
                client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            },
            poll_interval,
            next_subscription: Arc::new(AtomicU64::new(1)),
            pollers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.rest.config
    }
}

const fn select_columns(collection: Collection) -> &'static str {
    match collection {
        Collection::Requests => "*,requesters(*)",
        _ => "*",
    }
}

impl RemoteGateway for SupabaseGateway {
    async fn fetch_collection(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Value>> {
        self.rest
            .select(collection.table_name(), select_columns(collection), filters)
            .await
    }

    async fn insert(&self, collection: Collection, row: Value) -> Result<Value> {
        let url = format!("{}/{}", self.rest.config.rest_url(), collection.table_name());
        let request = self
            .rest
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(&row);

        match self.rest.send(request).await? {
            Value::Array(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
            Value::Object(object) => Ok(Value::Object(object)),
            _ => Err(Error::Api {
                status: 500,
                message: format!("insert into {collection} returned no row"),
            }),
        }
    }

    async fn update(&self, collection: Collection, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        if filters.is_empty() {
            return Err(Error::Validation(format!(
                "refusing to update every row of {collection}"
            )));
        }

        let table = collection.table_name();
        let url = format!("{}/{table}", self.rest.config.rest_url());
        let request = self
            .rest
            .client
            .patch(url)
            .query(&filter_query(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        let body = self.rest.send(request).await?;
        expect_rows(table, body)
    }

    async fn invoke(&self, procedure: &Procedure) -> Result<Value> {
        let url = format!("{}/rpc/{}", self.rest.config.rest_url(), procedure.name());
        let request = self.rest.client.post(url).json(&procedure.arguments());
        self.rest.send(request).await
    }

    async fn subscribe(&self, collections: &[Collection]) -> Result<Subscription> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (sender, events) = mpsc::unbounded_channel();
        let poller = ChangePoller {
            rest: self.rest.clone(),
            collections: collections.to_vec(),
            interval: self.poll_interval,
            sender,
        };

        let handle = tokio::spawn(poller.run(id));
        self.pollers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);
        Ok(Subscription { id, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let handle = self
            .pollers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!(subscription = %id, "change poller stopped");
        }
    }
}

type Fingerprints = HashMap<String, u64>;

struct ChangePoller {
    rest: RestClient,
    collections: Vec<Collection>,
    interval: Duration,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangePoller {
    async fn run(self, id: SubscriptionId) {
        let mut baselines: HashMap<Collection, Fingerprints> = HashMap::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.sender.is_closed() {
                tracing::debug!(subscription = %id, "change feed receiver dropped");
                return;
            }
            for &collection in &self.collections {
                let rows = match self.rest.select(collection.table_name(), "*", &[]).await {
                    Ok(rows) => rows,
                    Err(error) => {
                        tracing::warn!(subscription = %id, %collection, "Change poll failed: {}", error);
                        continue;
                    }
                };

                let current = fingerprint_rows(&rows);
                let Some(previous) = baselines.insert(collection, current) else {
                    continue;
                };
                let current = &baselines[&collection];

                for kind in diff_fingerprints(&previous, current) {
                    if self.sender.send(ChangeEvent::new(collection, kind)).is_err() {
                        tracing::debug!(subscription = %id, "change feed receiver dropped");
                        return;
                    }
                }
            }
        }
    }
}

fn row_identity(row: &Value) -> String {
    match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => row.to_string(),
    }
}

fn fingerprint_rows(rows: &[Value]) -> Fingerprints {
    rows.iter()
        .map(|row| {
            let mut hasher = DefaultHasher::new();
            row.to_string().hash(&mut hasher);
            (row_identity(row), hasher.finish())
        })
        .collect()
}

/// Change kinds between two snapshots, deletes first.
fn diff_fingerprints(previous: &Fingerprints, current: &Fingerprints) -> Vec<ChangeKind> {
    let mut kinds = Vec::new();
    if previous.keys().any(|id| !current.contains_key(id)) {
        kinds.push(ChangeKind::Delete);
    }
    if current.keys().any(|id| !previous.contains_key(id)) {
        kinds.push(ChangeKind::Insert);
    }
    if current
        .iter()
        .any(|(id, hash)| previous.get(id).is_some_and(|old| old != hash))
    {
        kinds.push(ChangeKind::Update);
    }
    kinds
}

fn filter_query(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| (filter.column.clone(), format!("eq.{}", filter_literal(&filter.value))))
        .collect()
}

fn expect_rows(table: &str, body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::Api {
            status: 500,
            message: format!("expected row array from {table}, got {}", compact_text(&other.to_string())),
        }),
    }
}

fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> Error {
    let message = match serde_json::from_str::<PostgrestErrorBody>(body) {
        Ok(payload) => payload
            .message
            .or(payload.error)
            .or(payload.hint)
            .map(|message| message.trim().to_string()),
        Err(_) => None,
    }
    .or_else(|| {
        let trimmed = compact_text(body);
        (!trimmed.is_empty()).then_some(trimmed)
    })
    .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    Error::Api {
        status: status.as_u16(),
        message,
    }
}
