//! A store whose value comes from a remote endpoint.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core_store::{
    Error as StoreError, Flight, KeyValueStorage, Reporter, Selector, SharedReporter, Store,
};

use crate::endpoint::{Endpoint, EndpointBuilder, FetchKind, SuccessHook};
use crate::query::{Query, QueryOptions, Trigger};
use crate::{FetchError, Fetchable, Method, Request, Transport};

/// Where a [`FetchStore`] sends its requests.
pub enum PathSpec<P> {
    /// The same path for every request.
    Static(String),
    /// A path computed from the request params.
    Dynamic(Arc<dyn Fn(&P) -> String + Send + Sync>),
}

impl<P> PathSpec<P> {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&P) -> String + Send + Sync + 'static,
    {
        PathSpec::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, params: &P) -> String {
        match self {
            PathSpec::Static(path) => path.clone(),
            PathSpec::Dynamic(f) => f(params),
        }
    }
}

impl<P> Clone for PathSpec<P> {
    fn clone(&self) -> Self {
        match self {
            PathSpec::Static(path) => PathSpec::Static(path.clone()),
            PathSpec::Dynamic(f) => PathSpec::Dynamic(Arc::clone(f)),
        }
    }
}

impl<P> fmt::Debug for PathSpec<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Static(path) => f.debug_tuple("Static").field(path).finish(),
            PathSpec::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl<P> From<&str> for PathSpec<P> {
    fn from(path: &str) -> Self {
        PathSpec::Static(path.to_string())
    }
}

impl<P> From<String> for PathSpec<P> {
    fn from(path: String) -> Self {
        PathSpec::Static(path)
    }
}

struct FetchInner<T, P> {
    endpoint: Endpoint<T>,
    path: PathSpec<P>,
}

/// A value loaded from a remote endpoint, plus its request lifecycle.
///
/// Besides the value itself a `FetchStore` keeps three flag stores that a UI
/// can subscribe to independently:
///
/// - `loading`: `true` while a fetch is in flight
/// - `error`: the last failure, cleared by the next success
/// - `fetched`: `true` once any fetch has succeeded
///
/// Handles are cheap clones of one shared instance.
///
/// # Example
///
/// ```rust,ignore
/// let order = FetchStore::<Option<Order>, ()>::builder(transport)
///     .path("/orders/42")
///     .build()?;
///
/// order.fetch(()).await?;
/// assert!(order.is_fetched());
/// ```
pub struct FetchStore<T, P = ()> {
    inner: Arc<FetchInner<T, P>>,
}

impl<T, P> Clone for FetchStore<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, P> fmt::Debug for FetchStore<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchStore")
            .field("method", &self.inner.endpoint.method)
            .field("path", &self.inner.path)
            .finish()
    }
}

impl<T, P> FetchStore<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    /// Start configuring a store. Set a path before building.
    pub fn builder(transport: impl Transport + 'static) -> FetchStoreBuilder<T, P>
    where
        T: Default,
    {
        FetchStoreBuilder::new(Arc::new(transport), Method::GET, T::default())
    }

    pub(crate) fn from_parts(endpoint: Endpoint<T>, path: PathSpec<P>) -> Self {
        Self {
            inner: Arc::new(FetchInner { endpoint, path }),
        }
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn reporter(&self) -> SharedReporter {
        self.inner.endpoint.reporter.clone()
    }

    pub fn method(&self) -> Method {
        self.inner.endpoint.method
    }

    /// Fetch with `params` and write the response into the store.
    ///
    /// Failures are recorded in the error flag and returned.
    pub async fn fetch(&self, params: P) -> Result<T, FetchError> {
        let request = self.prepare(&params)?;
        self.run(request).await
    }

    /// Single-flight fetch for suspending readers.
    ///
    /// Calls for the same method, path and query share one request while it
    /// is in flight. The settled result is written to the store like
    /// [`FetchStore::fetch`].
    pub fn suspend(&self, params: P) -> Flight<T, FetchError> {
        if let Err(e) = tokio::runtime::Handle::try_current() {
            return Flight::ready(Err(StoreError::NoRuntime {
                message: e.to_string(),
            }
            .into()));
        }

        let request = match self.prepare(&params) {
            Ok(request) => request,
            Err(e) => return Flight::ready(Err(e)),
        };

        let key = format!("{} {}", request.method, request.target());
        let store = self.clone();
        self.inner
            .endpoint
            .flights
            .run(key, move || async move { store.run(request).await })
    }

    fn prepare(&self, params: &P) -> Result<Request, FetchError> {
        let endpoint = &self.inner.endpoint;
        let path = self.inner.path.resolve(params);
        endpoint.request(path, params).map_err(|e| endpoint.reject(e))
    }

    async fn run(&self, request: Request) -> Result<T, FetchError> {
        let endpoint = &self.inner.endpoint;
        endpoint
            .execute(request, &endpoint.loading, |value| {
                endpoint.commit(value.clone(), FetchKind::Fresh, |data, value| data.set(value));
                endpoint.fetched.set(true);
            })
            .await
    }

    pub fn data(&self) -> T {
        self.inner.endpoint.data.get()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.inner.endpoint.error.get()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.endpoint.loading.get()
    }

    pub fn is_fetched(&self) -> bool {
        self.inner.endpoint.fetched.get()
    }

    pub fn data_store(&self) -> &Store<T> {
        &self.inner.endpoint.data
    }

    pub fn loading_store(&self) -> &Store<bool> {
        &self.inner.endpoint.loading
    }

    pub fn error_store(&self) -> &Store<Option<FetchError>> {
        &self.inner.endpoint.error
    }

    pub fn fetched_store(&self) -> &Store<bool> {
        &self.inner.endpoint.fetched
    }

    /// A view of the value narrowed through `projection`.
    pub fn select<U, F>(&self, projection: F) -> Selector<T, U>
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        self.inner.endpoint.data.select(projection)
    }

    /// Bind the fetch to a mount: fetch once now unless told to skip.
    pub fn trigger(&self, options: QueryOptions<P>) -> Result<Trigger<Self, T, P>, FetchError> {
        Trigger::start(self.clone(), options, self.reporter())
    }

    /// Mount a query view over this store.
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

    /// Back to the initial value with every flag cleared.
    pub fn reset(&self) {
        self.inner.endpoint.reset()
    }
}

#[async_trait]
impl<T, P> Fetchable<T, P> for FetchStore<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    async fn fetch(&self, params: P) -> Result<T, FetchError> {
        FetchStore::fetch(self, params).await
    }

    fn data(&self) -> T {
        FetchStore::data(self)
    }

    fn error(&self) -> Option<FetchError> {
        FetchStore::error(self)
    }

    fn is_loading(&self) -> bool {
        FetchStore::is_loading(self)
    }

    fn is_fetched(&self) -> bool {
        FetchStore::is_fetched(self)
    }
}

/// Builder for [`FetchStore`].
pub struct FetchStoreBuilder<T, P> {
    endpoint: EndpointBuilder<T>,
    path: Option<PathSpec<P>>,
    _params: PhantomData<fn(&P)>,
}

impl<T, P> FetchStoreBuilder<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    pub(crate) fn new(transport: Arc<dyn Transport>, method: Method, initial: T) -> Self {
        Self {
            endpoint: EndpointBuilder::new(transport, method, initial),
            path: None,
            _params: PhantomData,
        }
    }

    /// Request path, relative to the transport's base URL.
    pub fn path(mut self, path: impl Into<PathSpec<P>>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Compute the request path from the params.
    pub fn path_fn<F>(self, f: F) -> Self
    where
        F: Fn(&P) -> String + Send + Sync + 'static,
    {
        self.path(PathSpec::dynamic(f))
    }

    pub fn method(mut self, method: Method) -> Self {
        self.endpoint.method = method;
        self
    }

    /// Header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.endpoint.headers.insert(name.into(), value.into());
        self
    }

    /// Value held before the first successful fetch and after `reset`.
    pub fn initial(mut self, initial: T) -> Self {
        self.endpoint.initial = initial;
        self
    }

    /// Persist the value under `key`.
    pub fn persist(mut self, key: impl Into<String>, storage: impl KeyValueStorage + 'static) -> Self
    where
        T: Serialize,
    {
        self.endpoint = self.endpoint.persist(key.into(), Arc::new(storage));
        self
    }

    /// Take over success handling; see [`SuccessHook`].
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Store<T>, T, FetchKind) + Send + Sync + 'static,
    {
        self.endpoint.on_success = Some(Arc::new(hook) as SuccessHook<T>);
        self
    }

    /// Sink for failures of mount fetches and persistence.
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.endpoint.reporter = Arc::new(reporter);
        self
    }

    pub fn build(self) -> Result<FetchStore<T, P>, FetchError> {
        let path = self.path.ok_or_else(|| FetchError::Config {
            message: "no request path configured".to_string(),
        })?;
        Ok(FetchStore::from_parts(self.endpoint.build()?, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: String,
        total: u32,
    }

    #[derive(Serialize)]
    struct OrderParams {
        id: u32,
    }

    #[tokio::test]
    async fn fetch_writes_value_and_flags() {
        let transport =
            MockTransport::new().with_response("/orders/42", json!({"id": "42", "total": 7}));
        let store = FetchStore::<Order, ()>::builder(transport)
            .path("/orders/42")
            .build()
            .unwrap();

        assert!(!store.is_fetched());
        let order = store.fetch(()).await.unwrap();

        assert_eq!(order.total, 7);
        assert_eq!(store.data(), order);
        assert!(store.is_fetched());
        assert!(!store.is_loading());
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn failure_keeps_value_and_fetched() {
        let transport = MockTransport::new();
        let store = FetchStore::<Order, ()>::builder(transport)
            .path("/orders/1")
            .initial(Order {
                id: "cached".to_string(),
                total: 1,
            })
            .build()
            .unwrap();

        let result = store.fetch(()).await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(store.data().id, "cached");
        assert!(!store.is_fetched());
        assert!(matches!(store.error(), Some(FetchError::Status { .. })));
    }

    #[tokio::test]
    async fn loading_goes_true_then_false() {
        let transport = MockTransport::new().with_response("/orders", json!([]));
        let store = FetchStore::<Vec<Order>, ()>::builder(transport)
            .path("/orders")
            .build()
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store
            .loading_store()
            .subscribe(move |v| sink.lock().unwrap().push(*v));

        store.fetch(()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn dynamic_path_and_query_params() {
        let transport = MockTransport::new().with_response("/orders/7", json!({"id": "7", "total": 3}));
        let store = FetchStore::<Order, OrderParams>::builder(transport.clone())
            .path_fn(|p: &OrderParams| format!("/orders/{}", p.id))
            .header("x-client", "tests")
            .build()
            .unwrap();

        store.fetch(OrderParams { id: 7 }).await.unwrap();

        let request = &transport.recorded_requests()[0];
        assert_eq!(request.path, "/orders/7");
        assert_eq!(request.query.get("id"), Some(&"7".to_string()));
        assert_eq!(request.headers.get("x-client"), Some(&"tests".to_string()));
    }

    #[tokio::test]
    async fn write_method_sends_params_as_body() {
        let transport = MockTransport::new().with_response("/orders", json!({"id": "9", "total": 0}));
        let store = FetchStore::<Order, OrderParams>::builder(transport.clone())
            .path("/orders")
            .method(Method::PUT)
            .build()
            .unwrap();

        store.fetch(OrderParams { id: 9 }).await.unwrap();

        let request = &transport.recorded_requests()[0];
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.body, Some(json!({"id": 9})));
    }

    #[tokio::test]
    async fn success_hook_takes_over_the_write() {
        let transport = MockTransport::new().with_response("/orders", json!([{"id": "a", "total": 2}]));
        let store = FetchStore::<Vec<Order>, ()>::builder(transport)
            .path("/orders")
            .on_success(|data, orders: Vec<Order>, _| {
                data.set(orders.into_iter().filter(|o| o.total > 5).collect());
            })
            .build()
            .unwrap();

        let response = store.fetch(()).await.unwrap();

        assert_eq!(response.len(), 1);
        assert!(store.data().is_empty());
        assert!(store.is_fetched());
    }

    #[tokio::test]
    async fn suspend_shares_one_request() {
        let transport = MockTransport::new()
            .with_response("/orders/42", json!({"id": "42", "total": 1}))
            .with_delay(Duration::from_millis(20));
        let store = FetchStore::<Order, ()>::builder(transport.clone())
            .path("/orders/42")
            .build()
            .unwrap();

        let first = store.suspend(());
        let second = store.suspend(());
        assert!(first.try_read().is_pending());

        assert_eq!(first.read().await.unwrap().id, "42");
        assert_eq!(second.read().await.unwrap().id, "42");
        assert_eq!(transport.request_count(), 1);
        assert_eq!(store.data().id, "42");

        store.suspend(()).read().await.unwrap();
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn suspend_outside_a_runtime_is_an_error() {
        let store = FetchStore::<Order, ()>::builder(MockTransport::new())
            .path("/orders/42")
            .build()
            .unwrap();

        let flight = store.suspend(());
        assert!(flight.is_settled());
        assert!(matches!(
            flight.try_read(),
            stowage_core_store::ReadState::Ready(Err(FetchError::Store(StoreError::NoRuntime { .. })))
        ));
    }

    #[test]
    fn build_without_path_fails() {
        let result = FetchStore::<Order, ()>::builder(MockTransport::new()).build();
        assert!(matches!(result, Err(FetchError::Config { .. })));
    }

    #[tokio::test]
    async fn bad_params_are_recorded() {
        let store = FetchStore::<Order, u32>::builder(MockTransport::new())
            .path("/orders")
            .build()
            .unwrap();

        let result = store.fetch(5).await;

        assert!(matches!(result, Err(FetchError::Params { .. })));
        assert!(matches!(store.error(), Some(FetchError::Params { .. })));
    }

    #[tokio::test]
    async fn reset_restores_initial_value() {
        let transport = MockTransport::new().with_response("/orders", json!([{"id": "a", "total": 1}]));
        let store = FetchStore::<Vec<Order>, ()>::builder(transport)
            .path("/orders")
            .build()
            .unwrap();

        store.fetch(()).await.unwrap();
        store.reset();

        assert!(store.data().is_empty());
        assert!(!store.is_fetched());
    }

    #[tokio::test]
    async fn selector_follows_fetched_data() {
        let transport = MockTransport::new()
            .with_response("/orders", json!([{"id": "a", "total": 1}, {"id": "b", "total": 2}]));
        let store = FetchStore::<Vec<Order>, ()>::builder(transport)
            .path("/orders")
            .build()
            .unwrap();
        let total = store.select(|orders| orders.iter().map(|o| o.total).sum::<u32>());

        store.fetch(()).await.unwrap();
        assert_eq!(total.snapshot(), 3);
    }
}
