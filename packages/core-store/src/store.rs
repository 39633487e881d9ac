//! The observable, optionally persisted value store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::persist::{self, Codec, KeyValueStorage, PersistConfig, Persistence};
use crate::report::{default_reporter, Reporter, SharedReporter};
use crate::selector::Selector;
use crate::Error;

/// Callback invoked with the new value after every write.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Registration returned by `subscribe`.
///
/// Dropping it leaves the observer registered; call [`Subscription::unsubscribe`]
/// to remove it.
#[must_use = "call unsubscribe() to remove the observer"]
pub struct Subscription {
    id: SubscriptionId,
    detach: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            detach: Box::new(detach),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the observer. It will not see any later write.
    pub fn unsubscribe(self) {
        (self.detach)()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct Slot<T> {
    value: T,
    /// Set by any local write; a pending hydration will not overwrite it.
    written: bool,
}

pub(crate) struct Inner<T> {
    slot: RwLock<Slot<T>>,
    /// Held across slot write, notification and save enqueue, so every
    /// writer publishes in the order it wrote.
    publishing: Mutex<()>,
    observers: RwLock<BTreeMap<SubscriptionId, Observer<T>>>,
    next_id: AtomicU64,
    version: watch::Sender<u64>,
    persistence: Option<Persistence<T>>,
    hydration: Option<Store<bool>>,
    reporter: SharedReporter,
}

/// A single observable value.
///
/// - `get()` returns a clone of the current value.
/// - `set(value)` / `update(f)` replace it, notify every observer
///   synchronously, then enqueue a persistence write if configured.
/// - `subscribe(observer)` registers a change callback.
/// - `select(projection)` narrows the value seen by observers.
///
/// `Store` is a handle: clones share the same value, observers and
/// persistence binding. Use [`Store::ptr_eq`] to compare identity.
///
/// # Example
///
/// ```rust
/// use stowage_core_store::Store;
///
/// let count = Store::new(0u32);
/// let sub = count.subscribe(|n| println!("count is now {n}"));
///
/// count.set(1);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 2);
///
/// sub.unsubscribe();
/// ```
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Store")
            .field("value", &slot.value)
            .field("key", &self.key())
            .finish()
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Store<T> {
    pub(crate) fn from_inner(inner: Arc<Inner<T>>) -> Self {
        Self { inner }
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The persistence key, if this store is persisted.
    pub fn key(&self) -> Option<&str> {
        self.inner.persistence.as_ref().map(|p| p.key.as_str())
    }

    pub fn is_persisted(&self) -> bool {
        self.inner.persistence.is_some()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    /// Create an in-memory store. It is always hydrated.
    pub fn new(initial: T) -> Self {
        Self::assemble(initial, None, None, default_reporter())
    }

    /// Start configuring a store, e.g. to persist it.
    pub fn builder(initial: T) -> StoreBuilder<T> {
        StoreBuilder::new(initial)
    }

    fn assemble(
        initial: T,
        persistence: Option<Persistence<T>>,
        hydration: Option<Store<bool>>,
        reporter: SharedReporter,
    ) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                slot: RwLock::new(Slot {
                    value: initial,
                    written: false,
                }),
                publishing: Mutex::new(()),
                observers: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                version,
                persistence,
                hydration,
                reporter,
            }),
        }
    }

    /// Clone of the current value. No side effects.
    pub fn get(&self) -> T {
        self.read(T::clone)
    }

    /// Read the current value without cloning it.
    ///
    /// `f` must not write to this store.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let slot = self.inner.slot.read().unwrap_or_else(PoisonError::into_inner);
        f(&slot.value)
    }

    /// Current value, as seen by a UI binding. Same as [`Store::get`].
    pub fn snapshot(&self) -> T {
        self.get()
    }

    /// Replace the value and notify observers.
    ///
    /// Concurrent writers are serialized: observers and the persisted blob
    /// see writes in the order they landed. Observers must not write to the
    /// store that is notifying them.
    pub fn set(&self, value: T) {
        let _publishing = self.publishing();
        {
            let mut slot = self.inner.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.value = value.clone();
            slot.written = true;
        }
        self.publish(value, true);
    }

    /// Compute the next value from the current one and store it.
    ///
    /// `f` runs under the write lock and must not touch this store.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let _publishing = self.publishing();
        let value = {
            let mut slot = self.inner.slot.write().unwrap_or_else(PoisonError::into_inner);
            let next = f(&slot.value);
            slot.value = next.clone();
            slot.written = true;
            next
        };
        self.publish(value, true);
    }

    /// Apply a value loaded from storage unless a local write got there first.
    pub(crate) fn apply_hydrated(&self, value: T) -> bool {
        let _publishing = self.publishing();
        {
            let mut slot = self.inner.slot.write().unwrap_or_else(PoisonError::into_inner);
            if slot.written {
                return false;
            }
            slot.value = value.clone();
        }
        self.publish(value, false);
        true
    }

    fn publishing(&self) -> MutexGuard<'_, ()> {
        self.inner
            .publishing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, value: T, persist: bool) {
        let observers: Vec<Observer<T>> = self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for observer in observers {
            observer(&value);
        }

        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));

        if !persist {
            return;
        }
        if let Some(persistence) = &self.inner.persistence {
            if let Err(e) = persistence.save(value) {
                self.inner.reporter.report(&e);
            }
        }
    }

    /// Register `observer`; it is called with every later value.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observe(Arc::new(observer))
    }

    pub(crate) fn observe(&self, observer: Observer<T>) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, observer);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .observers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        })
    }

    /// A view of this store narrowed through `projection`.
    ///
    /// The selector fires on every write to the store, whether or not the
    /// projected value changed.
    pub fn select<U, F>(&self, projection: F) -> Selector<T, U>
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        Selector::new(self.clone(), projection)
    }

    /// Wait for the next write, then return the current value.
    ///
    /// A later write may land between the wake-up and the read, in which
    /// case the later value is returned.
    pub async fn changed(&self) -> T {
        let mut rx = self.inner.version.subscribe();
        let _ = rx.changed().await;
        self.get()
    }

    /// Wait until `predicate` holds for the current value.
    pub async fn wait_for<F>(&self, mut predicate: F) -> T
    where
        F: FnMut(&T) -> bool,
    {
        let mut rx = self.inner.version.subscribe();
        loop {
            let value = self.get();
            if predicate(&value) {
                return value;
            }
            // The sender lives as long as `self`, so this cannot fail.
            if rx.changed().await.is_err() {
                return value;
            }
        }
    }

    /// `true` unless the store is persisted and still loading.
    pub fn is_hydrated(&self) -> bool {
        match &self.inner.hydration {
            Some(flag) => flag.get(),
            None => true,
        }
    }

    /// The hydration flag sub-store, present only on persisted stores.
    pub fn hydration_flag(&self) -> Option<&Store<bool>> {
        self.inner.hydration.as_ref()
    }

    /// Resolve once hydration has settled.
    pub async fn hydrated(&self) {
        if let Some(flag) = &self.inner.hydration {
            flag.wait_for(|done| *done).await;
        }
    }

    /// Remove the persisted blob. The in-memory value is untouched.
    pub fn clear(&self) {
        if let Some(persistence) = &self.inner.persistence {
            if let Err(e) = persistence.remove() {
                self.inner.reporter.report(&e);
            }
        }
    }

    /// Wait until every save or removal queued before this call has settled.
    ///
    /// Storage failures are reported, not returned; only a dead worker is an error.
    pub async fn flush(&self) -> Result<(), Error> {
        match &self.inner.persistence {
            Some(persistence) => persistence.flush().await,
            None => Ok(()),
        }
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder<T> {
    initial: T,
    persist: Option<PersistConfig<T>>,
    reporter: SharedReporter,
}

impl<T: Clone + Send + Sync + 'static> StoreBuilder<T> {
    pub fn new(initial: T) -> Self {
        Self {
            initial,
            persist: None,
            reporter: default_reporter(),
        }
    }

    /// Replace the value the store starts with.
    pub fn initial(mut self, initial: T) -> Self {
        self.initial = initial;
        self
    }

    /// Persist every write under `key` and hydrate from it on build.
    pub fn persist(self, key: impl Into<String>, storage: impl KeyValueStorage + 'static) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        self.persist_shared(key, Arc::new(storage))
    }

    /// Like [`StoreBuilder::persist`], with an already shared backend.
    pub fn persist_shared(mut self, key: impl Into<String>, storage: Arc<dyn KeyValueStorage>) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        self.persist = Some(PersistConfig {
            key: key.into(),
            storage,
            codec: Codec::json(),
        });
        self
    }

    /// Sink for hydration and persistence failures.
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn shared_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build the store.
    ///
    /// A persisted store starts hydrating immediately, which needs a Tokio
    /// runtime; outside of one this returns [`Error::NoRuntime`].
    pub fn build(self) -> Result<Store<T>, Error> {
        let Some(config) = self.persist else {
            return Ok(Store::assemble(self.initial, None, None, self.reporter));
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::NoRuntime {
            message: e.to_string(),
        })?;

        let (persistence, commands) = Persistence::channel(config.key.clone());
        let hydration = Store::new(false);
        let store = Store::assemble(
            self.initial,
            Some(persistence),
            Some(hydration.clone()),
            self.reporter.clone(),
        );

        tracing::debug!(key = %config.key, "hydrating store");
        runtime.spawn(persist::run_worker(
            Arc::downgrade(&store.inner),
            hydration,
            config,
            self.reporter,
            commands,
        ));

        Ok(store)
    }
}
