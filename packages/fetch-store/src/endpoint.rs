//! Request lifecycle shared by every remote-backed store.
//!
//! An [`Endpoint`] owns the value store and its three lifecycle flags
//! (`loading`, `error`, `fetched`) and knows how to send one request,
//! decode the response, and settle the flags in the right order.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use stowage_core_store::{KeyValueStorage, SharedReporter, SingleFlight, Store, StoreBuilder, TracingReporter};

use crate::{FetchError, Method, Request, Transport};

/// Which operation produced a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    /// A fresh fetch. The default write replaces the value.
    Fresh,
    /// A paginated continuation. The default write aggregates into the value.
    LoadMore,
}

/// Custom success handling.
///
/// When configured it takes full control: the default value write is
/// skipped and the hook decides what, if anything, lands in the store.
pub type SuccessHook<T> = Arc<dyn Fn(&Store<T>, T, FetchKind) + Send + Sync>;

/// Holds a loading flag up for as long as it lives.
struct Busy<'a> {
    flag: &'a Store<bool>,
}

impl<'a> Busy<'a> {
    fn raise(flag: &'a Store<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

pub(crate) struct Endpoint<T> {
    pub(crate) data: Store<T>,
    pub(crate) loading: Store<bool>,
    pub(crate) error: Store<Option<FetchError>>,
    pub(crate) fetched: Store<bool>,
    pub(crate) method: Method,
    pub(crate) reporter: SharedReporter,
    pub(crate) flights: SingleFlight<String, T, FetchError>,
    transport: Arc<dyn Transport>,
    headers: BTreeMap<String, String>,
    on_success: Option<SuccessHook<T>>,
    initial: T,
}

impl<T> Endpoint<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// A request for `path` carrying `params`, without the flags touched.
    pub(crate) fn request<P>(&self, path: String, params: &P) -> Result<Request, FetchError>
    where
        P: Serialize + ?Sized,
    {
        let mut request = Request::new(self.method, path);
        request.headers = self.headers.clone();
        request.with_params(params)
    }

    /// Record a failure that happened before any request went out.
    pub(crate) fn reject(&self, error: FetchError) -> FetchError {
        self.error.set(Some(error.clone()));
        error
    }

    /// Send `request` with `flag` raised.
    ///
    /// On success the error flag is cleared and `commit` runs; on failure
    /// the error flag is set. `flag` drops back to `false` after either.
    pub(crate) async fn execute<F>(
        &self,
        request: Request,
        flag: &Store<bool>,
        commit: F,
    ) -> Result<T, FetchError>
    where
        F: FnOnce(&T) + Send,
    {
        let _busy = Busy::raise(flag);
        let method = request.method;
        let path = request.path.clone();
        tracing::debug!(%method, path = %path, "request started");

        let outcome = match self.transport.send(request).await {
            Ok(body) => decode::<T>(&path, body),
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(value) => {
                if self.error.read(Option::is_some) {
                    self.error.set(None);
                }
                commit(value);
                tracing::debug!(%method, path = %path, "request finished");
            }
            Err(e) => {
                tracing::debug!(%method, path = %path, error = %e, "request failed");
                self.error.set(Some(e.clone()));
            }
        }

        outcome
    }

    /// Hand `value` to the success hook, or to `write` when there is none.
    pub(crate) fn commit<W>(&self, value: T, kind: FetchKind, write: W)
    where
        W: FnOnce(&Store<T>, T),
    {
        match &self.on_success {
            Some(hook) => hook(&self.data, value, kind),
            None => write(&self.data, value),
        }
    }

    /// Back to the initial value with every flag cleared.
    pub(crate) fn reset(&self) {
        self.data.set(self.initial.clone());
        self.error.set(None);
        self.fetched.set(false);
        self.loading.set(false);
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: Value) -> Result<T, FetchError> {
    let empty = body.is_null();
    serde_json::from_value(body).map_err(|e| {
        if empty {
            FetchError::EmptyResponse {
                path: path.to_string(),
            }
        } else {
            FetchError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            }
        }
    })
}

/// Settings every remote-backed store builder shares.
pub(crate) struct EndpointBuilder<T> {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) method: Method,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) initial: T,
    pub(crate) on_success: Option<SuccessHook<T>>,
    pub(crate) reporter: SharedReporter,
    store: StoreBuilder<T>,
}

impl<T> EndpointBuilder<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(transport: Arc<dyn Transport>, method: Method, initial: T) -> Self {
        Self {
            transport,
            method,
            headers: BTreeMap::new(),
            store: StoreBuilder::new(initial.clone()),
            initial,
            on_success: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub(crate) fn persist(mut self, key: String, storage: Arc<dyn KeyValueStorage>) -> Self
    where
        T: Serialize,
    {
        self.store = self.store.persist_shared(key, storage);
        self
    }

    pub(crate) fn build(self) -> Result<Endpoint<T>, FetchError> {
        let data = self
            .store
            .initial(self.initial.clone())
            .shared_reporter(self.reporter.clone())
            .build()?;

        Ok(Endpoint {
            data,
            loading: Store::new(false),
            error: Store::new(None),
            fetched: Store::new(false),
            method: self.method,
            reporter: self.reporter,
            flights: SingleFlight::new(),
            transport: self.transport,
            headers: self.headers,
            on_success: self.on_success,
            initial: self.initial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;
    use std::sync::Mutex;

    fn endpoint(transport: MockTransport) -> Endpoint<Vec<u32>> {
        EndpointBuilder::new(Arc::new(transport), Method::GET, Vec::new())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn flag_is_raised_during_the_request_and_lowered_after() {
        let transport = MockTransport::new().with_response("/n", json!([1, 2]));
        let endpoint = endpoint(transport);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = endpoint.loading.subscribe(move |v| sink.lock().unwrap().push(*v));

        let request = endpoint.request("/n".to_string(), &()).unwrap();
        let value = endpoint
            .execute(request, &endpoint.loading, |v| endpoint.data.set(v.clone()))
            .await
            .unwrap();

        assert_eq!(value, vec![1, 2]);
        assert_eq!(endpoint.data.get(), vec![1, 2]);
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn failure_sets_error_and_skips_commit() {
        let endpoint = endpoint(MockTransport::new().fail_with("offline"));

        let request = endpoint.request("/n".to_string(), &()).unwrap();
        let result = endpoint
            .execute(request, &endpoint.loading, |_| panic!("commit on failure"))
            .await;

        assert_eq!(result, Err(FetchError::transport("offline")));
        assert_eq!(endpoint.error.get(), Some(FetchError::transport("offline")));
        assert!(!endpoint.loading.get());
    }

    #[tokio::test]
    async fn success_clears_a_previous_error() {
        let transport = MockTransport::new().with_response("/n", json!([]));
        let endpoint = endpoint(transport);
        endpoint.error.set(Some(FetchError::transport("earlier")));

        let request = endpoint.request("/n".to_string(), &()).unwrap();
        endpoint
            .execute(request, &endpoint.loading, |_| {})
            .await
            .unwrap();

        assert_eq!(endpoint.error.get(), None);
    }

    #[tokio::test]
    async fn null_body_is_an_empty_response() {
        let transport = MockTransport::new().with_response("/n", Value::Null);
        let endpoint = endpoint(transport);

        let request = endpoint.request("/n".to_string(), &()).unwrap();
        let result = endpoint.execute(request, &endpoint.loading, |_| {}).await;

        assert_eq!(
            result,
            Err(FetchError::EmptyResponse {
                path: "/n".to_string()
            })
        );
    }

    #[tokio::test]
    async fn mismatched_body_is_a_decode_error() {
        let transport = MockTransport::new().with_response("/n", json!({"not": "a list"}));
        let endpoint = endpoint(transport);

        let request = endpoint.request("/n".to_string(), &()).unwrap();
        let result = endpoint.execute(request, &endpoint.loading, |_| {}).await;

        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[test]
    fn hook_replaces_the_default_write() {
        let mut builder =
            EndpointBuilder::new(Arc::new(MockTransport::new()), Method::GET, Vec::<u32>::new());
        builder.on_success = Some(Arc::new(|data: &Store<Vec<u32>>, value: Vec<u32>, kind| {
            assert_eq!(kind, FetchKind::Fresh);
            data.set(value.into_iter().map(|n| n * 10).collect());
        }));
        let endpoint = builder.build().unwrap();

        endpoint.commit(vec![1, 2], FetchKind::Fresh, |_, _| panic!("default write"));
        assert_eq!(endpoint.data.get(), vec![10, 20]);
    }

    #[test]
    fn reset_restores_initial_state() {
        let endpoint = endpoint(MockTransport::new());
        endpoint.data.set(vec![9]);
        endpoint.fetched.set(true);
        endpoint.error.set(Some(FetchError::transport("x")));

        endpoint.reset();

        assert!(endpoint.data.get().is_empty());
        assert!(!endpoint.fetched.get());
        assert_eq!(endpoint.error.get(), None);
    }
}
