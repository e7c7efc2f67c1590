use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::data_set::{DataSetName, DocumentPath};
use crate::domain::user::UserId;
use crate::repository::remote_store::{DocumentSnapshot, DocumentSubscription, RemoteDocumentStore};
use crate::services::write_governor::WriteGovernor;

/// Field of the remote document holding the data set's value.
const VALUE_FIELD: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    /// Quiet period after the last update before writing.
    pub debounce: Duration,
    /// Minimum gap between two physical writes of one binding.
    pub min_write_spacing: Duration,
}

impl SyncTimings {
    /// No debounce and no spacing: every update is written right away.
    pub fn immediate() -> Self {
        Self {
            debounce: Duration::ZERO,
            min_write_spacing: Duration::ZERO,
        }
    }
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            min_write_spacing: Duration::from_secs(3),
        }
    }
}

/// Values a binding can hold. Equality decides whether an update or a
/// remote notification changes anything, so it has to agree with JSON
/// equality of the serialized form (use ordered maps, not key-order
/// sensitive containers).
pub trait SyncValue: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> SyncValue for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Factory for bindings; holds the collaborators every binding shares.
#[derive(Clone)]
pub struct SyncChannel {
    store: Arc<dyn RemoteDocumentStore>,
    governor: WriteGovernor,
    timings: SyncTimings,
}

impl SyncChannel {
    pub fn new(store: Arc<dyn RemoteDocumentStore>, governor: WriteGovernor, timings: SyncTimings) -> Self {
        Self {
            store,
            governor,
            timings,
        }
    }

    pub fn governor(&self) -> &WriteGovernor {
        &self.governor
    }

    pub fn timings(&self) -> SyncTimings {
        self.timings
    }

    /// Binds `data_set` for `user`. With a user, the remote subscription is
    /// opened immediately and the binding reports loading until the first
    /// snapshot arrives.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind<T: SyncValue>(&self, user: Option<UserId>, data_set: DataSetName, initial: T) -> SyncBinding<T> {
        let (value, _) = watch::channel(initial.clone());
        let (loading, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            data_set,
            initial,
            store: self.store.clone(),
            governor: self.governor.clone(),
            timings: self.timings,
            value,
            loading,
            state: Mutex::new(BindingState::default()),
        });

        let binding = SyncBinding { shared };
        binding.set_user(user);
        binding
    }
}

#[derive(Default)]
struct BindingState {
    user: Option<UserId>,
    /// Bumped whenever the binding is torn down or switches user; work
    /// started under an older generation must not touch state or the store.
    generation: u64,
    next_ticket: u64,
    subscription: Option<JoinHandle<()>>,
    pending: Option<PendingWrite>,
    last_write_at: Option<Instant>,
}

struct PendingWrite {
    ticket: u64,
    handle: JoinHandle<()>,
}

impl BindingState {
    fn owns(&self, generation: u64, ticket: u64) -> bool {
        self.generation == generation && self.pending.as_ref().is_some_and(|p| p.ticket == ticket)
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }
}

struct Shared<T> {
    data_set: DataSetName,
    initial: T,
    store: Arc<dyn RemoteDocumentStore>,
    governor: WriteGovernor,
    timings: SyncTimings,
    value: watch::Sender<T>,
    loading: watch::Sender<bool>,
    state: Mutex<BindingState>,
}

impl<T: SyncValue> Shared<T> {
    fn replace_if_changed(&self, next: T) -> bool {
        self.value.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    fn set_loading(&self, loading: bool) {
        self.loading.send_if_modified(|current| {
            let changed = *current != loading;
            *current = loading;
            changed
        });
    }

    /// Cancels all outstanding work and falls back to the initial value.
    fn teardown(&self, state: &mut BindingState) {
        state.generation += 1;
        if let Some(subscription) = state.subscription.take() {
            subscription.abort();
        }
        state.cancel_pending();
        self.replace_if_changed(self.initial.clone());
        self.set_loading(false);
    }

    fn apply_snapshot(&self, path: &DocumentPath, snapshot: DocumentSnapshot) {
        let next = match snapshot.field(VALUE_FIELD) {
            None | Some(Value::Null) => self.initial.clone(),
            Some(raw) => match serde_json::from_value::<T>(raw.clone()) {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %path, error = %e, "Ignoring undecodable remote value");
                    self.set_loading(false);
                    return;
                }
            },
        };

        // Equal values are our own write echoing back: no change event.
        if self.replace_if_changed(next) {
            debug!(path = %path, "Applied remote change");
        }
        self.set_loading(false);
    }
}

/// One data set kept in sync with its remote document.
///
/// Local updates apply immediately and are written back after a debounce,
/// spaced out and subject to the shared [`WriteGovernor`]. Remote changes
/// are applied only when they differ from the local value. Dropping the
/// binding cancels its subscription and any write that has not started.
pub struct SyncBinding<T: SyncValue> {
    shared: Arc<Shared<T>>,
}

impl<T: SyncValue> SyncBinding<T> {
    pub fn data_set(&self) -> &DataSetName {
        &self.shared.data_set
    }

    pub fn user(&self) -> Option<UserId> {
        self.shared.state.lock().user.clone()
    }

    pub fn value(&self) -> T {
        self.shared.value.borrow().clone()
    }

    pub fn loading(&self) -> bool {
        *self.shared.loading.borrow()
    }

    /// Reactive view of the value; receivers are notified on every real
    /// change, never on no-op updates or remote echoes.
    pub fn watch(&self) -> watch::Receiver<T> {
        self.shared.value.subscribe()
    }

    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.shared.loading.subscribe()
    }

    /// Whether a write is scheduled but not yet sent.
    pub fn has_pending_write(&self) -> bool {
        self.shared
            .state
            .lock()
            .pending
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }

    pub fn set(&self, value: T) {
        self.update(move |_| value);
    }

    /// Applies `change` to the latest local value and schedules the result
    /// for writing. `change` must not call back into this binding.
    pub fn update(&self, change: impl FnOnce(&T) -> T) {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        let Some(user) = state.user.clone() else {
            warn!(data_set = %shared.data_set, "Update ignored: no signed-in user");
            return;
        };

        let next = change(&shared.value.borrow());
        if !shared.replace_if_changed(next.clone()) {
            return;
        }

        state.cancel_pending();
        state.next_ticket += 1;
        let ticket = state.next_ticket;
        let generation = state.generation;
        let path = DocumentPath::new(&user, &shared.data_set);
        let handle = tokio::spawn(write_back(shared.clone(), path, generation, ticket, next));
        state.pending = Some(PendingWrite { ticket, handle });
    }

    /// Switches the signed-in user. Any change, including to `None`,
    /// cancels the old subscription and pending work and resets the value
    /// to its initial state before subscribing for the new user.
    pub fn set_user(&self, user: Option<UserId>) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.user == user && (user.is_none() || state.subscription.is_some()) {
            return;
        }

        shared.teardown(&mut state);
        state.user = user.clone();
        state.last_write_at = None;

        if let Some(user) = user {
            let path = DocumentPath::new(&user, &shared.data_set);
            shared.set_loading(true);
            let subscription = shared.store.subscribe(&path);
            debug!(path = %path, "Subscribed");
            state.subscription = Some(tokio::spawn(follow_document(
                shared.clone(),
                path,
                state.generation,
                subscription,
            )));
        }
    }
}

impl<T: SyncValue> Drop for SyncBinding<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        self.shared.teardown(&mut state);
    }
}

async fn follow_document<T: SyncValue>(
    shared: Arc<Shared<T>>,
    path: DocumentPath,
    generation: u64,
    mut subscription: DocumentSubscription,
) {
    while let Some(event) = subscription.next().await {
        let state = shared.state.lock();
        if state.generation != generation {
            return;
        }

        match event {
            Ok(snapshot) => shared.apply_snapshot(&path, snapshot),
            Err(e) => {
                // The store client owns reconnection.
                warn!(path = %path, error = %e, "Subscription error");
                shared.set_loading(false);
            }
        }
    }
}

async fn write_back<T: SyncValue>(
    shared: Arc<Shared<T>>,
    path: DocumentPath,
    generation: u64,
    ticket: u64,
    snapshot: T,
) {
    tokio::time::sleep(shared.timings.debounce).await;

    if !shared.state.lock().owns(generation, ticket) {
        return;
    }
    if !shared.governor.attempt_write(&shared.data_set) {
        warn!(path = %path, "Write dropped: circuit breaker open");
        let mut state = shared.state.lock();
        if state.owns(generation, ticket) {
            state.pending = None;
        }
        return;
    }

    let wait = {
        let state = shared.state.lock();
        if !state.owns(generation, ticket) {
            return;
        }
        state
            .last_write_at
            .map(|at| shared.timings.min_write_spacing.saturating_sub(at.elapsed()))
            .unwrap_or_default()
    };
    if !wait.is_zero() {
        debug!(path = %path, wait_ms = wait.as_millis() as u64, "Spacing out write");
        tokio::time::sleep(wait).await;
    }

    {
        let mut state = shared.state.lock();
        if !state.owns(generation, ticket) {
            return;
        }
        // From here on the write is in flight; later updates schedule a
        // new write instead of cancelling this one.
        state.pending = None;
    }

    let payload = match serde_json::to_value(&snapshot) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(path = %path, error = %e, "Could not serialize value for write");
            return;
        }
    };
    let mut partial = Map::new();
    partial.insert(VALUE_FIELD.to_string(), payload);

    match shared.store.merge_write(&path, partial).await {
        Ok(()) => {
            let mut state = shared.state.lock();
            if state.generation == generation {
                state.last_write_at = Some(Instant::now());
            }
            debug!(path = %path, "Write committed");
        }
        // Local state stays as it is; the next successful write reconciles.
        Err(e) => warn!(path = %path, error = %e, "Write failed"),
    }
}
