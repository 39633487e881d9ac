//! Mount-time bindings for UI code.
//!
//! A [`Trigger`] ties a store's fetch to a component becoming active: it
//! issues one fresh fetch on creation unless told to skip, and keeps the
//! fetch around for manual refetches. A [`Query`] bundles a trigger with
//! read access to the store's value and flags.

use std::marker::PhantomData;

use stowage_core_store::{Error as StoreError, SharedReporter, Store};
use tokio::task::JoinHandle;

use crate::{FetchError, Fetchable, Paginated, PaginatedFetchStore};

/// Options for [`Trigger`] and [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions<P> {
    /// Params for the mount fetch.
    pub params: P,
    /// Do not fetch on mount.
    pub skip_on_mount: bool,
}

/// Same options, named for trigger-only use.
pub type TriggerOptions<P> = QueryOptions<P>;

impl<P> QueryOptions<P> {
    pub fn new(params: P) -> Self {
        Self {
            params,
            skip_on_mount: false,
        }
    }

    pub fn skip_on_mount(mut self) -> Self {
        self.skip_on_mount = true;
        self
    }
}

/// A fetch bound to a mount.
///
/// Dropping a trigger does not cancel a mount fetch that is still running.
pub struct Trigger<S, T, P> {
    store: S,
    mount: Option<JoinHandle<()>>,
    _marker: PhantomData<fn(P) -> T>,
}

impl<S, T, P> Trigger<S, T, P>
where
    S: Fetchable<T, P> + Clone + 'static,
    T: Send + 'static,
    P: Send + 'static,
{
    pub(crate) fn start(
        store: S,
        options: QueryOptions<P>,
        reporter: SharedReporter,
    ) -> Result<Self, FetchError> {
        let mount = if options.skip_on_mount {
            None
        } else {
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                FetchError::Store(StoreError::NoRuntime {
                    message: e.to_string(),
                })
            })?;
            let mounted = store.clone();
            let params = options.params;
            Some(runtime.spawn(async move {
                if let Err(e) = mounted.fetch(params).await {
                    reporter.report(&e);
                }
            }))
        };

        Ok(Self {
            store,
            mount,
            _marker: PhantomData,
        })
    }

    /// Fetch again with `params`.
    pub async fn refetch(&self, params: P) -> Result<T, FetchError> {
        self.store.fetch(params).await
    }

    /// Wait for the mount fetch, if one was started and is still pending.
    pub async fn mounted(&mut self) {
        if let Some(handle) = self.mount.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "mount fetch task did not complete");
            }
        }
    }

    pub fn fetches_on_mount(&self) -> bool {
        self.mount.is_some()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Value, flags, and refetch for one mounted store.
///
/// Every accessor reads the store's own sub-stores; the query holds no
/// state of its own beyond the trigger.
pub struct Query<T, P, S> {
    trigger: Trigger<S, T, P>,
    data: Store<T>,
    error: Store<Option<FetchError>>,
    loading: Store<bool>,
    fetched: Store<bool>,
}

impl<T, P, S> Query<T, P, S>
where
    S: Fetchable<T, P> + Clone + 'static,
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    pub(crate) fn new(
        trigger: Trigger<S, T, P>,
        data: Store<T>,
        error: Store<Option<FetchError>>,
        loading: Store<bool>,
        fetched: Store<bool>,
    ) -> Self {
        Self {
            trigger,
            data,
            error,
            loading,
            fetched,
        }
    }

    pub fn data(&self) -> T {
        self.data.get()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.error.get()
    }

    pub fn loading(&self) -> bool {
        self.loading.get()
    }

    pub fn fetched(&self) -> bool {
        self.fetched.get()
    }

    pub async fn refetch(&self, params: P) -> Result<T, FetchError> {
        self.trigger.refetch(params).await
    }

    pub async fn mounted(&mut self) {
        self.trigger.mounted().await
    }

    /// The value store, for subscribing.
    pub fn data_store(&self) -> &Store<T> {
        &self.data
    }

    pub fn trigger(&self) -> &Trigger<S, T, P> {
        &self.trigger
    }
}

/// [`Query`] plus pagination state.
pub struct PaginatedQuery<T, P> {
    query: Query<T, P, PaginatedFetchStore<T, P>>,
    loading_more: Store<bool>,
    reached_end: Store<bool>,
}

impl<T, P> PaginatedQuery<T, P>
where
    PaginatedFetchStore<T, P>: Paginated<T, P> + Clone + 'static,
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    pub(crate) fn new(
        query: Query<T, P, PaginatedFetchStore<T, P>>,
        loading_more: Store<bool>,
        reached_end: Store<bool>,
    ) -> Self {
        Self {
            query,
            loading_more,
            reached_end,
        }
    }

    pub fn data(&self) -> T {
        self.query.data()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.query.error()
    }

    pub fn loading(&self) -> bool {
        self.query.loading()
    }

    pub fn fetched(&self) -> bool {
        self.query.fetched()
    }

    pub fn loading_more(&self) -> bool {
        self.loading_more.get()
    }

    pub fn has_reached_end(&self) -> bool {
        self.reached_end.get()
    }

    /// Fresh fetch: back to the first page.
    pub async fn refetch(&self, params: P) -> Result<T, FetchError> {
        self.query.refetch(params).await
    }

    pub async fn load_more(&self, params: P) -> Result<T, FetchError> {
        self.query.trigger().store().load_more(params).await
    }

    pub async fn mounted(&mut self) {
        self.query.mounted().await
    }

    pub fn data_store(&self) -> &Store<T> {
        self.query.data_store()
    }
}
