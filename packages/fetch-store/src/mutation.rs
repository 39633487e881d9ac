//! A fetch store for write operations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core_store::{KeyValueStorage, Reporter, Store};

use crate::endpoint::FetchKind;
use crate::fetch::{FetchStoreBuilder, PathSpec};
use crate::query::{Query, QueryOptions, Trigger};
use crate::{FetchError, FetchStore, Fetchable, Method, Transport};

/// Sends writes and keeps the last response.
///
/// Defaults to `POST` and never fetches on mount: [`MutationStore::trigger`]
/// and [`MutationStore::query`] force `skip_on_mount` whatever the options
/// say. Call [`MutationStore::mutate`] to send.
pub struct MutationStore<T, P = ()> {
    store: FetchStore<T, P>,
}

impl<T, P> Clone for MutationStore<T, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T, P> fmt::Debug for MutationStore<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutationStore").field(&self.store).finish()
    }
}

impl<T, P> MutationStore<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    pub fn builder(transport: impl Transport + 'static) -> MutationStoreBuilder<T, P>
    where
        T: Default,
    {
        MutationStoreBuilder {
            inner: FetchStoreBuilder::new(Arc::new(transport), Method::POST, T::default()),
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        FetchStore::ptr_eq(&a.store, &b.store)
    }

    /// Send the write with `params` and keep the response.
    pub async fn mutate(&self, params: P) -> Result<T, FetchError> {
        self.store.fetch(params).await
    }

    pub fn data(&self) -> T {
        self.store.data()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.store.error()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn is_fetched(&self) -> bool {
        self.store.is_fetched()
    }

    pub fn data_store(&self) -> &Store<T> {
        self.store.data_store()
    }

    pub fn loading_store(&self) -> &Store<bool> {
        self.store.loading_store()
    }

    pub fn error_store(&self) -> &Store<Option<FetchError>> {
        self.store.error_store()
    }

    pub fn fetched_store(&self) -> &Store<bool> {
        self.store.fetched_store()
    }

    /// The underlying fetch store.
    pub fn as_fetch_store(&self) -> &FetchStore<T, P> {
        &self.store
    }

    /// A trigger that never fetches on mount.
    pub fn trigger(&self, options: QueryOptions<P>) -> Result<Trigger<Self, T, P>, FetchError> {
        Trigger::start(self.clone(), options.skip_on_mount(), self.store.reporter())
    }

    /// A query view that never fetches on mount.
    pub fn query(&self, options: QueryOptions<P>) -> Result<Query<T, P, Self>, FetchError> {
        let trigger = self.trigger(options)?;
        Ok(Query::new(
            trigger,
            self.data_store().clone(),
            self.error_store().clone(),
            self.loading_store().clone(),
            self.fetched_store().clone(),
        ))
    }

    pub fn reset(&self) {
        self.store.reset()
    }
}

#[async_trait]
impl<T, P> Fetchable<T, P> for MutationStore<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    async fn fetch(&self, params: P) -> Result<T, FetchError> {
        self.mutate(params).await
    }

    fn data(&self) -> T {
        MutationStore::data(self)
    }

    fn error(&self) -> Option<FetchError> {
        MutationStore::error(self)
    }

    fn is_loading(&self) -> bool {
        MutationStore::is_loading(self)
    }

    fn is_fetched(&self) -> bool {
        MutationStore::is_fetched(self)
    }
}

/// Builder for [`MutationStore`].
pub struct MutationStoreBuilder<T, P> {
    inner: FetchStoreBuilder<T, P>,
}

impl<T, P> MutationStoreBuilder<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    pub fn path(mut self, path: impl Into<PathSpec<P>>) -> Self {
        self.inner = self.inner.path(path);
        self
    }

    pub fn path_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&P) -> String + Send + Sync + 'static,
    {
        self.inner = self.inner.path_fn(f);
        self
    }

    /// Override the default `POST`.
    pub fn method(mut self, method: Method) -> Self {
        self.inner = self.inner.method(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    pub fn initial(mut self, initial: T) -> Self {
        self.inner = self.inner.initial(initial);
        self
    }

    pub fn persist(mut self, key: impl Into<String>, storage: impl KeyValueStorage + 'static) -> Self
    where
        T: Serialize,
    {
        self.inner = self.inner.persist(key, storage);
        self
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Store<T>, T, FetchKind) + Send + Sync + 'static,
    {
        self.inner = self.inner.on_success(hook);
        self
    }

    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.inner = self.inner.reporter(reporter);
        self
    }

    pub fn build(self) -> Result<MutationStore<T, P>, FetchError> {
        Ok(MutationStore {
            store: self.inner.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    struct Created {
        id: String,
    }

    #[derive(Serialize)]
    struct NewOrder {
        sku: String,
    }

    fn store(transport: MockTransport) -> MutationStore<Created, NewOrder> {
        MutationStore::builder(transport)
            .path("/orders")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn mutate_posts_params_as_body() {
        let transport = MockTransport::new().with_response("/orders", json!({"id": "o-1"}));
        let store = store(transport.clone());

        let created = store
            .mutate(NewOrder {
                sku: "a-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(created.id, "o-1");
        assert_eq!(store.data(), created);
        let request = &transport.recorded_requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body, Some(json!({"sku": "a-1"})));
    }

    #[tokio::test]
    async fn query_never_mounts_even_when_asked() {
        let transport = MockTransport::new().with_response("/orders", json!({"id": "o-1"}));
        let store = store(transport.clone());

        let options = QueryOptions {
            params: NewOrder {
                sku: "a-1".to_string(),
            },
            skip_on_mount: false,
        };
        let mut query = store.query(options).unwrap();
        query.mounted().await;

        assert!(!query.trigger().fetches_on_mount());
        assert_eq!(transport.request_count(), 0);
        assert!(!query.fetched());

        query
            .refetch(NewOrder {
                sku: "b-2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn trigger_needs_no_runtime() {
        let store = store(MockTransport::new());
        let trigger = store.trigger(QueryOptions::new(NewOrder {
            sku: "x".to_string(),
        }));
        assert!(trigger.is_ok());
    }

    #[tokio::test]
    async fn method_can_be_overridden() {
        let transport = MockTransport::new().with_response("/orders/1", json!({"id": "1"}));
        let store = MutationStore::<Created, ()>::builder(transport.clone())
            .path("/orders/1")
            .method(Method::DELETE)
            .build()
            .unwrap();

        store.mutate(()).await.unwrap();
        assert_eq!(transport.recorded_requests()[0].method, Method::DELETE);
    }

    #[tokio::test]
    async fn failed_mutation_surfaces_and_records() {
        let store = store(MockTransport::new().fail_with("offline"));

        let result = store
            .mutate(NewOrder {
                sku: "a".to_string(),
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.error(), Some(FetchError::transport("offline")));
        assert!(!store.is_loading());
    }
}
