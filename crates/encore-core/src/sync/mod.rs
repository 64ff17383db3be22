//! Sync orchestrator: owns one session against a remote gateway.
//!
//! A session subscribes to the backend change feed, debounces notifications
//! per collection, refreshes the request cache, and publishes a ranked
//! [`QueueSnapshot`] after every state change. User actions (submit, vote,
//! lock) are applied optimistically and resolved against the backend.
//!
//! Every public operation returns an [`Outcome`]; nothing here panics or
//! propagates an error to the caller. Results that arrive after `stop()` are
//! discarded.

mod view;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::{CacheRead, CacheStore};
use crate::config::{EngineConfig, SessionIdentity};
use crate::debounce::{ChangeDebouncer, Trigger};
use crate::error::{Error, Outcome, Result, StaleDataWarning};
use crate::gateway::{
    create_request, fetch_requests, fetch_settings, fetch_songs, interpret_vote, ChangeEvent,
    Collection, Procedure, RemoteGateway, SubscriptionId,
};
use crate::lock::{plan_toggle, plan_unlock};
use crate::models::{NewRequest, QueueSettings, Request, RequestRef, Song};
use crate::optimistic::{MutationKind, OptimisticState};
use crate::ranking::AggregateRequest;
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::state::ConnectionState;
use crate::util::millis;

pub use view::{compose_view, QueueSnapshot};

const SUBMIT_KEY: &str = "submit";
const LOCK_KEY: &str = "lock";

#[derive(Debug, Clone)]
enum CachedCollection {
    Requests(Vec<Request>),
    Songs(Vec<Song>),
    Settings(QueueSettings),
}

#[derive(Debug)]
struct SessionState {
    cache: CacheStore<Collection, CachedCollection>,
    optimistic: OptimisticState,
    connection: ConnectionState,
    warning: Option<StaleDataWarning>,
}

impl SessionState {
    fn requests(&self) -> Option<CacheRead<Vec<Request>>> {
        match self.cache.get(&Collection::Requests)? {
            CacheRead {
                value: CachedCollection::Requests(requests),
                is_stale,
            } => Some(CacheRead {
                value: requests,
                is_stale,
            }),
            _ => None,
        }
    }

    fn authoritative(&self) -> Vec<Request> {
        self.requests().map(|read| read.value).unwrap_or_default()
    }

    fn view(&self, now: Instant) -> Vec<AggregateRequest> {
        compose_view(&self.authoritative(), &self.optimistic, now)
    }
}

#[derive(Debug)]
struct SessionTasks {
    subscription: SubscriptionId,
    event_loop: JoinHandle<()>,
}

struct Inner<G> {
    gateway: G,
    config: EngineConfig,
    identity: SessionIdentity,
    retry: RetryScheduler,
    session: Mutex<SessionState>,
    snapshot: watch::Sender<QueueSnapshot>,
    refreshing: AtomicBool,
    online: AtomicBool,
    epoch: AtomicU64,
    tasks: Mutex<Option<SessionTasks>>,
}

/// Clears the in-flight refresh flag when the refresh ends or is dropped.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<G: RemoteGateway> Inner<G> {
    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Option<SessionTasks>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    fn build_snapshot(&self) -> QueueSnapshot {
        let session = self.lock_session();
        let read = session.requests();
        let stale = read.as_ref().is_some_and(|read| read.is_stale) || session.warning.is_some();
        let authoritative = read.map(|read| read.value).unwrap_or_default();

        QueueSnapshot {
            requests: compose_view(&authoritative, &session.optimistic, Instant::now()),
            connection: session.connection,
            stale,
            warning: session.warning.clone(),
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.build_snapshot());
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.lock_session().connection = connection;
        self.publish();
    }

    fn cache_ttl_set(&self, collection: Collection, value: CachedCollection) {
        let ttl = self.config.ttl_for(collection);
        self.lock_session().cache.set(collection, value, ttl);
    }

    fn is_fresh(&self, collection: Collection) -> bool {
        self.lock_session().cache.get_fresh(&collection).is_some()
    }

    /// Record a failed read, keeping whatever the cache still holds on screen.
    fn serve_stale(&self, collection: Collection, error: &Error) -> Outcome {
        let warning = {
            let mut session = self.lock_session();
            let warning = session
                .cache
                .get(&collection)
                .map(|_| StaleDataWarning {
                    collection: collection.to_string(),
                    reason: error.to_string(),
                });
            if collection.affects_queue() {
                session.connection = if self.is_online() {
                    ConnectionState::Error
                } else {
                    ConnectionState::Offline
                };
                session.warning.clone_from(&warning);
            }
            warning
        };
        self.publish();

        if warning.is_some() {
            tracing::warn!(%collection, "Refresh failed, serving cached data: {}", error);
        } else {
            tracing::warn!(%collection, "Refresh failed with nothing cached: {}", error);
        }
        Outcome::failed(error).with_warning(warning)
    }

    async fn refresh(&self, force: bool) -> Outcome {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            tracing::debug!("refresh already in flight, dropping duplicate");
            return Outcome::ok();
        }
        let _guard = RefreshGuard(&self.refreshing);
        let epoch = self.epoch();

        if force {
            self.lock_session().cache.invalidate(&Collection::Requests);
        } else if self.is_fresh(Collection::Requests) {
            return Outcome::ok();
        }

        if !self.is_online() {
            return self.serve_stale(
                Collection::Requests,
                &Error::Disconnected("client is offline".to_string()),
            );
        }

        self.set_connection(ConnectionState::Syncing);
        let gateway = &self.gateway;
        let result = self
            .retry
            .run("fetch:requests", self.config.retry_policy(), || {
                fetch_requests(gateway)
            })
            .await;
        if !self.is_current(epoch) {
            return Outcome::failed(Error::Stopped);
        }

        match result {
            Ok(requests) => {
                let count = requests.len();
                {
                    let mut session = self.lock_session();
                    let report = session.optimistic.reconcile(&requests, Instant::now());
                    if report.changed() {
                        tracing::debug!(?report, "optimistic state reconciled");
                    }
                    session.cache.set(
                        Collection::Requests,
                        CachedCollection::Requests(requests),
                        self.config.ttl_for(Collection::Requests),
                    );
                    session.connection = ConnectionState::Synced;
                    session.warning = None;
                }
                self.publish();
                tracing::debug!(count, "requests refreshed");
                Outcome::ok()
            }
            Err(error) => self.serve_stale(Collection::Requests, &error),
        }
    }

    async fn refresh_songs(&self, force: bool) -> Outcome {
        let epoch = self.epoch();
        if force {
            self.lock_session().cache.invalidate(&Collection::Songs);
        } else if self.is_fresh(Collection::Songs) {
            return Outcome::ok();
        }
        if !self.is_online() {
            return self.serve_stale(
                Collection::Songs,
                &Error::Disconnected("client is offline".to_string()),
            );
        }

        let gateway = &self.gateway;
        let result = self
            .retry
            .run("fetch:songs", self.config.retry_policy(), || {
                fetch_songs(gateway)
            })
            .await;
        if !self.is_current(epoch) {
            return Outcome::failed(Error::Stopped);
        }

        match result {
            Ok(songs) => {
                self.cache_ttl_set(Collection::Songs, CachedCollection::Songs(songs));
                Outcome::ok()
            }
            Err(Error::AlreadyInProgress(_)) => Outcome::ok(),
            Err(error) => self.serve_stale(Collection::Songs, &error),
        }
    }

    /// Settings reads fail fast on a fixed timeout instead of retrying.
    async fn refresh_settings(&self, force: bool) -> Outcome {
        let epoch = self.epoch();
        if force {
            self.lock_session().cache.invalidate(&Collection::QueueSettings);
        } else if self.is_fresh(Collection::QueueSettings) {
            return Outcome::ok();
        }
        if !self.is_online() {
            return self.serve_stale(
                Collection::QueueSettings,
                &Error::Disconnected("client is offline".to_string()),
            );
        }

        let timeout = millis(self.config.settings_timeout_ms);
        let result = tokio::time::timeout(timeout, fetch_settings(&self.gateway))
            .await
            .unwrap_or(Err(Error::Timeout("queue settings")));
        if !self.is_current(epoch) {
            return Outcome::failed(Error::Stopped);
        }

        match result {
            Ok(settings) => {
                self.cache_ttl_set(
                    Collection::QueueSettings,
                    CachedCollection::Settings(settings),
                );
                Outcome::ok()
            }
            Err(error) => self.serve_stale(Collection::QueueSettings, &error),
        }
    }

    async fn refresh_collection(&self, collection: Collection) -> Outcome {
        match collection {
            Collection::Requests | Collection::Requesters | Collection::UserVotes => {
                self.refresh(true).await
            }
            Collection::Songs => self.refresh_songs(true).await,
            Collection::QueueSettings => self.refresh_settings(true).await,
        }
    }

    fn songs(&self) -> Vec<Song> {
        match self.lock_session().cache.get(&Collection::Songs) {
            Some(CacheRead {
                value: CachedCollection::Songs(songs),
                ..
            }) => songs,
            _ => Vec::new(),
        }
    }

    fn settings(&self) -> QueueSettings {
        match self.lock_session().cache.get(&Collection::QueueSettings) {
            Some(CacheRead {
                value: CachedCollection::Settings(settings),
                ..
            }) => settings,
            _ => QueueSettings::default(),
        }
    }

    fn validate_submission(&self, request: NewRequest) -> Result<NewRequest> {
        let request = request.normalized()?;
        let settings = self.settings();
        if !settings.accepting_requests {
            return Err(Error::Validation(
                "Requests are closed right now".to_string(),
            ));
        }
        let message_len = request.message.as_deref().map_or(0, |m| m.chars().count());
        if message_len > settings.max_message_len {
            return Err(Error::Validation(format!(
                "Message must be at most {} characters",
                settings.max_message_len
            )));
        }
        Ok(request)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(Error::Disconnected("client is offline".to_string()))
        }
    }

    async fn submit_request(&self, request: NewRequest) -> Outcome {
        let request = match self
            .validate_submission(request)
            .and_then(|request| self.ensure_online().map(|()| request))
        {
            Ok(request) => request,
            Err(error) => return Outcome::failed(error),
        };
        if self.retry.is_in_flight(SUBMIT_KEY) {
            return Outcome::failed(Error::AlreadyInProgress(SUBMIT_KEY.to_string()));
        }

        let epoch = self.epoch();
        let token = self
            .lock_session()
            .optimistic
            .begin_creation(request.clone(), Instant::now());
        self.publish();

        let gateway = &self.gateway;
        let pending = &request;
        let result = self
            .retry
            .run(SUBMIT_KEY, RetryPolicy::once(), || {
                create_request(gateway, pending)
            })
            .await;
        if !self.is_current(epoch) {
            return Outcome::failed(Error::Stopped);
        }

        match result {
            Ok(request_id) => {
                self.lock_session()
                    .optimistic
                    .confirm_creation(token, request_id);
                self.publish();
                tracing::info!(%request_id, title = %request.title, "Request submitted");
                let refreshed = self.refresh(true).await;
                Outcome::ok().with_warning(refreshed.warning)
            }
            Err(error) => {
                self.lock_session().optimistic.revert_creation(token);
                self.publish();
                tracing::warn!(title = %request.title, "Submission failed: {}", error);
                Outcome::failed(error)
            }
        }
    }

    async fn vote(&self, target: RequestRef) -> Outcome {
        let Some(request_id) = target.confirmed() else {
            return Outcome::failed(Error::Validation(
                "This request is still being submitted".to_string(),
            ));
        };
        if let Err(error) = self.ensure_online() {
            return Outcome::failed(error);
        }
        let key = format!("vote:{request_id}");
        if self.retry.is_in_flight(&key) {
            return Outcome::failed(Error::AlreadyInProgress(key));
        }

        let epoch = self.epoch();
        let began = {
            let mut session = self.lock_session();
            let now = Instant::now();
            let visible = session
                .view(now)
                .iter()
                .any(|aggregate| aggregate.contains(request_id));
            if visible {
                let row_votes = session
                    .authoritative()
                    .iter()
                    .find(|row| row.id == request_id)
                    .map_or(0, |row| row.votes);
                session.optimistic.begin_vote(request_id, row_votes, now);
            }
            visible
        };
        if !began {
            return Outcome::failed(Error::Validation(
                "Request is no longer in the queue".to_string(),
            ));
        }
        self.publish();

        let gateway = &self.gateway;
        let procedure = Procedure::AddVote {
            request_id,
            voter_id: self.identity.voter_id.clone(),
        };
        let procedure = &procedure;
        let result = self
            .retry
            .run(&key, RetryPolicy::once(), move || async move {
                let value = gateway.invoke(procedure).await?;
                interpret_vote(&value)
            })
            .await;
        if !self.is_current(epoch) {
            return Outcome::failed(Error::Stopped);
        }

        let now = Instant::now();
        match result {
            Ok(()) => {
                self.lock_session()
                    .optimistic
                    .confirm(request_id, MutationKind::Vote, now);
                self.publish();
                tracing::info!(%request_id, "Vote recorded");
                Outcome::ok()
            }
            Err(error) => {
                self.lock_session()
                    .optimistic
                    .revert(request_id, MutationKind::Vote, now);
                self.publish();
                tracing::warn!(%request_id, "Vote failed, reverted: {}", error);
                Outcome::failed(error)
            }
        }
    }

    async fn change_lock(&self, target: RequestRef, toggle: bool) -> Outcome {
        if !self.identity.is_operator() {
            return Outcome::failed(Error::Unauthorized(
                "only operators can change the locked request".to_string(),
            ));
        }
        let Some(request_id) = target.confirmed() else {
            return Outcome::failed(Error::Validation(
                "This request is still being submitted".to_string(),
            ));
        };
        if let Err(error) = self.ensure_online() {
            return Outcome::failed(error);
        }
        if self.retry.is_in_flight(LOCK_KEY) {
            return Outcome::failed(Error::AlreadyInProgress(LOCK_KEY.to_string()));
        }

        let epoch = self.epoch();
        let planned = {
            let mut session = self.lock_session();
            let now = Instant::now();
            let authoritative = session.authoritative();
            let view = compose_view(&authoritative, &session.optimistic, now);
            let displayed_locked = view
                .iter()
                .find(|aggregate| aggregate.is_locked)
                .and_then(|aggregate| aggregate.reference.confirmed());

            view.iter()
                .find(|aggregate| aggregate.contains(request_id))
                .and_then(|aggregate| {
                    let plan = if toggle {
                        plan_toggle(aggregate, &authoritative)
                    } else {
                        Some(plan_unlock(aggregate, &authoritative))
                    }?;
                    let primary = aggregate.reference.confirmed()?;
                    Some((plan, primary))
                })
                .map(|(plan, primary)| {
                    session
                        .optimistic
                        .begin_lock(primary, plan.kind(), displayed_locked, now);
                    (plan, primary)
                })
        };
        let Some((plan, primary)) = planned else {
            return Outcome::failed(Error::Validation(
                "Request is no longer in the queue".to_string(),
            ));
        };
        self.publish();

        let gateway = &self.gateway;
        let procedures = plan.procedures();
        let procedures = procedures.as_slice();
        let result = self
            .retry
            .run(LOCK_KEY, self.config.retry_policy(), move || async move {
                for procedure in procedures {
                    gateway.invoke(procedure).await?;
                }
                Ok::<(), Error>(())
            })
            .await;
        if !self.is_current(epoch) {
            return Outcome::failed(Error::Stopped);
        }

        let kind = plan.kind();
        let now = Instant::now();
        match result {
            Ok(()) => {
                self.lock_session().optimistic.confirm(primary, kind, now);
                self.publish();
                tracing::info!(request_id = %primary, ?kind, "Lock change applied");
                let refreshed = self.refresh(true).await;
                Outcome::ok().with_warning(refreshed.warning)
            }
            Err(error) => {
                self.lock_session().optimistic.revert(primary, kind, now);
                self.publish();
                tracing::warn!(request_id = %primary, ?kind, "Lock change failed, reverted: {}", error);
                Outcome::failed(error)
            }
        }
    }

    fn reconcile_tick(&self) {
        let report = {
            let mut session = self.lock_session();
            let authoritative = session.authoritative();
            session.optimistic.reconcile(&authoritative, Instant::now())
        };
        if report.changed() {
            self.publish();
        }
    }

    fn debouncer(&self, triggers: mpsc::UnboundedSender<Trigger<Collection>>) -> ChangeDebouncer<Collection> {
        Collection::ALL.iter().fold(
            ChangeDebouncer::new(self.config.debounce_for(Collection::Requests), triggers),
            |debouncer, &collection| {
                debouncer.with_window(collection, self.config.debounce_for(collection))
            },
        )
    }

    /// Subscribe to the change feed and spawn the event loop.
    async fn open_session(self: &Arc<Self>) -> Result<()> {
        let epoch = self.epoch();
        let subscription = self.gateway.subscribe(&Collection::ALL).await?;
        if !self.is_current(epoch) {
            self.gateway.unsubscribe(subscription.id).await;
            return Err(Error::Stopped);
        }

        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let debouncer = self.debouncer(trigger_tx);
        let event_loop = tokio::spawn(run_event_loop(
            Arc::clone(self),
            subscription.events,
            debouncer,
            trigger_rx,
        ));

        let previous = self.lock_tasks().replace(SessionTasks {
            subscription: subscription.id,
            event_loop,
        });
        if let Some(previous) = previous {
            previous.event_loop.abort();
            self.gateway.unsubscribe(previous.subscription).await;
        }
        tracing::info!(subscription = %subscription.id, "Change feed subscribed");
        Ok(())
    }

    async fn close_session(&self) {
        let tasks = self.lock_tasks().take();
        if let Some(tasks) = tasks {
            tasks.event_loop.abort();
            self.gateway.unsubscribe(tasks.subscription).await;
            tracing::info!(subscription = %tasks.subscription, "Change feed closed");
        }
    }
}

async fn run_event_loop<G: RemoteGateway>(
    inner: Arc<Inner<G>>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    mut debouncer: ChangeDebouncer<Collection>,
    mut triggers: mpsc::UnboundedReceiver<Trigger<Collection>>,
) {
    let mut ticker = tokio::time::interval(millis(inner.config.reconcile_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut feed_open = true;

    loop {
        tokio::select! {
            event = events.recv(), if feed_open => match event {
                Some(event) => {
                    tracing::trace!(collection = %event.collection, kind = ?event.kind, "change event");
                    debouncer.notify(event.collection, event.kind);
                }
                None => {
                    tracing::warn!("Change feed dropped, waiting for reconnect");
                    feed_open = false;
                    inner.set_connection(ConnectionState::Error);
                }
            },
            Some(trigger) = triggers.recv() => {
                if debouncer.accept(trigger) {
                    tracing::debug!(collection = %trigger.key, "debounced refresh");
                    inner.refresh_collection(trigger.key).await;
                }
            },
            _ = ticker.tick() => inner.reconcile_tick(),
        }
    }
}

/// One sync session against a [`RemoteGateway`].
pub struct SyncOrchestrator<G: RemoteGateway> {
    inner: Arc<Inner<G>>,
}

impl<G: RemoteGateway> SyncOrchestrator<G> {
    pub fn new(gateway: G, config: EngineConfig, identity: SessionIdentity) -> Result<Self> {
        config.validate()?;
        let optimistic = OptimisticState::new(
            millis(config.vote_grace_ms),
            millis(config.pending_max_age_ms),
        );
        let (snapshot, _) = watch::channel(QueueSnapshot::default());

        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                config,
                identity,
                retry: RetryScheduler::new(),
                session: Mutex::new(SessionState {
                    cache: CacheStore::new(),
                    optimistic,
                    connection: ConnectionState::Offline,
                    warning: None,
                }),
                snapshot,
                refreshing: AtomicBool::new(false),
                online: AtomicBool::new(true),
                epoch: AtomicU64::new(0),
                tasks: Mutex::new(None),
            }),
        })
    }

    pub fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.inner.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_tasks().is_some()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock_session().connection
    }

    /// Receiver that observes every published snapshot.
    pub fn watch_queue(&self) -> watch::Receiver<QueueSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.build_snapshot()
    }

    /// Ranked, deduplicated queue with optimistic overlays applied.
    pub fn current_requests(&self) -> Vec<AggregateRequest> {
        self.inner.lock_session().view(Instant::now())
    }

    /// Cached song catalog, possibly stale.
    pub fn songs(&self) -> Vec<Song> {
        self.inner.songs()
    }

    /// Cached queue settings, or defaults before the first read.
    pub fn settings(&self) -> QueueSettings {
        self.inner.settings()
    }

    /// Subscribe to the change feed and load initial data.
    pub async fn start(&self) -> Outcome {
        if self.is_running() {
            return Outcome::ok();
        }
        tracing::info!(voter_id = %self.inner.identity.voter_id, role = ?self.inner.identity.role, "Starting sync session");

        let subscribed = self.inner.open_session().await;
        if let Err(error) = &subscribed {
            tracing::warn!("Change feed subscription failed: {}", error);
        }
        let settings = self.inner.refresh_settings(false).await;
        let refreshed = self.inner.refresh(false).await;

        match subscribed {
            Err(error) => Outcome::failed(error).with_warning(refreshed.warning),
            Ok(()) if !refreshed.success => refreshed,
            Ok(()) => refreshed.with_warning(settings.warning),
        }
    }

    /// Tear down the session. Results of operations still in flight are discarded.
    pub async fn stop(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.close_session().await;
        self.inner.set_connection(ConnectionState::Offline);
        tracing::info!("Sync session stopped");
    }

    /// Re-subscribe and force a refresh, e.g. after coming back online.
    pub async fn reconnect(&self) -> Outcome {
        self.inner.online.store(true, Ordering::Release);
        self.inner.close_session().await;

        let subscribed = self.inner.open_session().await;
        let refreshed = self.inner.refresh(true).await;
        match subscribed {
            Err(error) => {
                tracing::warn!("Reconnect could not subscribe: {}", error);
                Outcome::failed(error).with_warning(refreshed.warning)
            }
            Ok(()) => refreshed,
        }
    }

    /// Record connectivity. While offline, mutations fail fast and reads serve the cache.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::AcqRel);
        if was_online && !online {
            tracing::info!("Client went offline");
            self.inner.set_connection(ConnectionState::Offline);
        }
    }

    /// Refresh requests. A concurrent call while a fetch is in flight is dropped.
    pub async fn refresh(&self, force: bool) -> Outcome {
        self.inner.refresh(force).await
    }

    pub async fn refresh_songs(&self, force: bool) -> Outcome {
        self.inner.refresh_songs(force).await
    }

    pub async fn refresh_settings(&self, force: bool) -> Outcome {
        self.inner.refresh_settings(force).await
    }

    pub async fn submit_request(&self, request: NewRequest) -> Outcome {
        self.inner.submit_request(request).await
    }

    pub async fn vote(&self, target: RequestRef) -> Outcome {
        self.inner.vote(target).await
    }

    /// Lock the target if it is unlocked, unlock it otherwise. Operators only.
    pub async fn toggle_lock(&self, target: RequestRef) -> Outcome {
        self.inner.change_lock(target, true).await
    }

    pub async fn unlock(&self, target: RequestRef) -> Outcome {
        self.inner.change_lock(target, false).await
    }

    /// Run one reconciliation pass now instead of waiting for the next tick.
    pub fn reconcile(&self) {
        self.inner.reconcile_tick();
    }
}

/// Dropping a running session aborts its event loop and releases the change
/// feed on the current runtime, as `stop()` would.
impl<G: RemoteGateway> Drop for SyncOrchestrator<G> {
    fn drop(&mut self) {
        let Some(tasks) = self.inner.lock_tasks().take() else {
            return;
        };
        tasks.event_loop.abort();
        let subscription = tasks.subscription;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(&self.inner);
                runtime.spawn(async move {
                    inner.gateway.unsubscribe(subscription).await;
                    tracing::debug!(%subscription, "Change feed released on drop");
                });
            }
            Err(_) => {
                tracing::warn!(%subscription, "Session dropped outside a runtime, change feed left open");
            }
        }
    }
}
