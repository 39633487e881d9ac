//! A fetch store that loads its value page by page.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core_store::{Error as StoreError, Flight, KeyValueStorage, Reporter, Selector, Store};

use crate::endpoint::{Endpoint, EndpointBuilder, FetchKind, SuccessHook};
use crate::page::{short_page, PageData};
use crate::query::{PaginatedQuery, Query, QueryOptions, Trigger};
use crate::{FetchError, Fetchable, Method, Paginated, Request, Transport};

/// Where a [`PaginatedFetchStore`] sends each page request.
pub enum PagePath {
    /// A fixed path; the page index and size travel as `page` and `limit`
    /// query parameters.
    Static(String),
    /// A path built from `(page, limit)`.
    Formatted(Arc<dyn Fn(u32, u32) -> String + Send + Sync>),
}

impl PagePath {
    fn request<T, P>(
        &self,
        endpoint: &Endpoint<T>,
        page: u32,
        limit: u32,
        params: &P,
    ) -> Result<Request, FetchError>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        P: Serialize,
    {
        match self {
            PagePath::Static(path) => Ok(endpoint
                .request(path.clone(), params)?
                .with_query("page", page)
                .with_query("limit", limit)),
            PagePath::Formatted(format) => endpoint.request(format(page, limit), params),
        }
    }
}

impl fmt::Debug for PagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PagePath::Static(path) => f.debug_tuple("Static").field(path).finish(),
            PagePath::Formatted(_) => f.write_str("Formatted(..)"),
        }
    }
}

impl From<&str> for PagePath {
    fn from(path: &str) -> Self {
        PagePath::Static(path.to_string())
    }
}

impl From<String> for PagePath {
    fn from(path: String) -> Self {
        PagePath::Static(path)
    }
}

/// Combines the value so far with the next page.
pub type Aggregate<T> = Arc<dyn Fn(&T, T) -> T + Send + Sync>;

/// Decides from one page result and the page size whether the sequence ended.
pub type EndCheck<T> = Arc<dyn Fn(&T, u32) -> bool + Send + Sync>;

/// Releases a continuation claim when dropped.
struct Claim<'a>(&'a AtomicBool);

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct PaginatedInner<T, P> {
    endpoint: Endpoint<T>,
    path: PagePath,
    page_size: u32,
    aggregate: Aggregate<T>,
    end_check: EndCheck<T>,
    page: Store<u32>,
    reached_end: Store<bool>,
    loading_more: Store<bool>,
    /// Bumped by every fresh fetch; continuations from an older sequence are dropped.
    generation: AtomicU64,
    /// Held by the one `load_more` allowed in flight.
    continuing: AtomicBool,
    _params: PhantomData<fn(&P)>,
}

/// A [`FetchStore`](crate::FetchStore) over a paged endpoint.
///
/// `fetch` loads page 0 and replaces the value; `load_more` loads the next
/// page and aggregates it into the value. The page cursor advances only
/// when a continuation succeeds, and once a page comes back short
/// `has_reached_end` stays `true` until the next fresh fetch.
///
/// Only one `load_more` runs at a time: a call made while another is in
/// flight returns the current value without a request. A fresh fetch started
/// while a continuation is pending wins; the stale page is discarded.
pub struct PaginatedFetchStore<T, P = ()> {
    inner: Arc<PaginatedInner<T, P>>,
}

impl<T, P> Clone for PaginatedFetchStore<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, P> fmt::Debug for PaginatedFetchStore<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginatedFetchStore")
            .field("path", &self.inner.path)
            .field("page_size", &self.inner.page_size)
            .finish()
    }
}

impl<T, P> PaginatedFetchStore<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    /// Start configuring a store with the default aggregation and end check.
    pub fn builder(transport: impl Transport + 'static) -> PaginatedFetchStoreBuilder<T, P>
    where
        T: PageData + Default,
    {
        PaginatedFetchStoreBuilder {
            endpoint: EndpointBuilder::new(Arc::new(transport), Method::GET, T::default()),
            path: None,
            page_size: DEFAULT_PAGE_SIZE,
            aggregate: Arc::new(|so_far: &T, next: T| so_far.clone().merge_page(next)),
            end_check: Arc::new(|page: &T, size| short_page(page, size)),
            _params: PhantomData,
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Fresh fetch of the first page.
    ///
    /// Resets the cursor to 0 and the end flag to `false` before the
    /// request, replaces the value on success and recomputes the end flag.
    pub async fn fetch(&self, params: P) -> Result<T, FetchError> {
        let request = self.start_fresh(&params)?;
        self.run_fresh(request).await
    }

    /// Single-flight fresh fetch for suspending readers.
    pub fn suspend(&self, params: P) -> Flight<T, FetchError> {
        if let Err(e) = tokio::runtime::Handle::try_current() {
            return Flight::ready(Err(StoreError::NoRuntime {
                message: e.to_string(),
            }
            .into()));
        }

        let inner = &self.inner;
        let request = match inner.path.request(&inner.endpoint, 0, inner.page_size, &params) {
            Ok(request) => request,
            Err(e) => return Flight::ready(Err(inner.endpoint.reject(e))),
        };

        let key = format!("{} {}", request.method, request.target());
        let store = self.clone();
        inner.endpoint.flights.run(key, move || async move {
            store.begin_sequence();
            store.run_fresh(request).await
        })
    }

    fn begin_sequence(&self) {
        let inner = &self.inner;
        inner.generation.fetch_add(1, Ordering::AcqRel);
        inner.page.set(0);
        inner.reached_end.set(false);
    }

    fn start_fresh(&self, params: &P) -> Result<Request, FetchError> {
        let inner = &self.inner;
        self.begin_sequence();
        inner
            .path
            .request(&inner.endpoint, 0, inner.page_size, params)
            .map_err(|e| inner.endpoint.reject(e))
    }

    async fn run_fresh(&self, request: Request) -> Result<T, FetchError> {
        let inner = &*self.inner;
        let endpoint = &inner.endpoint;
        endpoint
            .execute(request, &endpoint.loading, |value| {
                endpoint.commit(value.clone(), FetchKind::Fresh, |data, value| data.set(value));
                endpoint.fetched.set(true);
                inner
                    .reached_end
                    .set((inner.end_check)(value, inner.page_size));
            })
            .await
    }

    /// Load the next page and aggregate it into the value.
    ///
    /// Returns the aggregated value. After the end has been reached, or
    /// while another continuation is in flight, this returns the current
    /// value without a request.
    pub async fn load_more(&self, params: P) -> Result<T, FetchError> {
        let inner = &*self.inner;
        let endpoint = &inner.endpoint;

        if inner.reached_end.get() {
            return Ok(endpoint.data.get());
        }
        if inner.continuing.swap(true, Ordering::AcqRel) {
            tracing::debug!("load_more already in flight");
            return Ok(endpoint.data.get());
        }
        let _claim = Claim(&inner.continuing);

        let generation = inner.generation.load(Ordering::Acquire);
        let next = inner.page.get() + 1;
        let request = inner
            .path
            .request(endpoint, next, inner.page_size, &params)
            .map_err(|e| endpoint.reject(e))?;

        endpoint
            .execute(request, &inner.loading_more, |page| {
                if inner.generation.load(Ordering::Acquire) != generation {
                    tracing::debug!(page = next, "discarding page from a superseded fetch");
                    return;
                }
                endpoint.commit(page.clone(), FetchKind::LoadMore, |data, page| {
                    data.update(|so_far| (inner.aggregate)(so_far, page))
                });
                inner.page.set(next);
                inner
                    .reached_end
                    .set((inner.end_check)(page, inner.page_size));
            })
            .await?;

        Ok(endpoint.data.get())
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

    pub fn is_loading_more(&self) -> bool {
        self.inner.loading_more.get()
    }

    /// Index of the last page loaded.
    pub fn page(&self) -> u32 {
        self.inner.page.get()
    }

    pub fn page_size(&self) -> u32 {
        self.inner.page_size
    }

    pub fn has_reached_end(&self) -> bool {
        self.inner.reached_end.get()
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

    pub fn loading_more_store(&self) -> &Store<bool> {
        &self.inner.loading_more
    }

    pub fn reached_end_store(&self) -> &Store<bool> {
        &self.inner.reached_end
    }

    pub fn page_store(&self) -> &Store<u32> {
        &self.inner.page
    }

    pub fn select<U, F>(&self, projection: F) -> Selector<T, U>
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        self.inner.endpoint.data.select(projection)
    }

    /// Bind a fresh fetch to a mount.
    pub fn trigger(&self, options: QueryOptions<P>) -> Result<Trigger<Self, T, P>, FetchError> {
        Trigger::start(self.clone(), options, self.inner.endpoint.reporter.clone())
    }

    pub fn query(&self, options: QueryOptions<P>) -> Result<PaginatedQuery<T, P>, FetchError> {
        let trigger = self.trigger(options)?;
        let query = Query::new(
            trigger,
            self.data_store().clone(),
            self.error_store().clone(),
            self.loading_store().clone(),
            self.fetched_store().clone(),
        );
        Ok(PaginatedQuery::new(
            query,
            self.loading_more_store().clone(),
            self.reached_end_store().clone(),
        ))
    }

    /// Back to the initial value, page 0, every flag cleared.
    pub fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.endpoint.reset();
        self.inner.page.set(0);
        self.inner.reached_end.set(false);
        self.inner.loading_more.set(false);
    }
}

#[async_trait]
impl<T, P> Fetchable<T, P> for PaginatedFetchStore<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    async fn fetch(&self, params: P) -> Result<T, FetchError> {
        PaginatedFetchStore::fetch(self, params).await
    }

    fn data(&self) -> T {
        PaginatedFetchStore::data(self)
    }

    fn error(&self) -> Option<FetchError> {
        PaginatedFetchStore::error(self)
    }

    fn is_loading(&self) -> bool {
        PaginatedFetchStore::is_loading(self)
    }

    fn is_fetched(&self) -> bool {
        PaginatedFetchStore::is_fetched(self)
    }
}

#[async_trait]
impl<T, P> Paginated<T, P> for PaginatedFetchStore<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    async fn load_more(&self, params: P) -> Result<T, FetchError> {
        PaginatedFetchStore::load_more(self, params).await
    }

    fn page(&self) -> u32 {
        PaginatedFetchStore::page(self)
    }

    fn has_reached_end(&self) -> bool {
        PaginatedFetchStore::has_reached_end(self)
    }

    fn is_loading_more(&self) -> bool {
        PaginatedFetchStore::is_loading_more(self)
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Builder for [`PaginatedFetchStore`].
pub struct PaginatedFetchStoreBuilder<T, P> {
    endpoint: EndpointBuilder<T>,
    path: Option<PagePath>,
    page_size: u32,
    aggregate: Aggregate<T>,
    end_check: EndCheck<T>,
    _params: PhantomData<fn(&P)>,
}

impl<T, P> PaginatedFetchStoreBuilder<T, P>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    P: Serialize + Send + Sync + 'static,
{
    /// Fixed path; pages go out as `page` and `limit` query parameters.
    pub fn path(mut self, path: impl Into<PagePath>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Build each page's path from `(page, limit)`.
    pub fn path_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, u32) -> String + Send + Sync + 'static,
    {
        self.path = Some(PagePath::Formatted(Arc::new(f)));
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn aggregate<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, T) -> T + Send + Sync + 'static,
    {
        self.aggregate = Arc::new(f);
        self
    }

    /// Override the end-of-data check, which defaults to "page shorter
    /// than the page size".
    pub fn reached_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, u32) -> bool + Send + Sync + 'static,
    {
        self.end_check = Arc::new(f);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.endpoint.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.endpoint.headers.insert(name.into(), value.into());
        self
    }

    pub fn initial(mut self, initial: T) -> Self {
        self.endpoint.initial = initial;
        self
    }

    pub fn persist(mut self, key: impl Into<String>, storage: impl KeyValueStorage + 'static) -> Self
    where
        T: Serialize,
    {
        self.endpoint = self.endpoint.persist(key.into(), Arc::new(storage));
        self
    }

    /// Take over success handling for both fresh pages and continuations.
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Store<T>, T, FetchKind) + Send + Sync + 'static,
    {
        self.endpoint.on_success = Some(Arc::new(hook) as SuccessHook<T>);
        self
    }

    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.endpoint.reporter = Arc::new(reporter);
        self
    }

    pub fn build(self) -> Result<PaginatedFetchStore<T, P>, FetchError> {
        let path = self.path.ok_or_else(|| FetchError::Config {
            message: "no request path configured".to_string(),
        })?;
        if self.page_size == 0 {
            return Err(FetchError::Config {
                message: "page size must be at least 1".to_string(),
            });
        }

        Ok(PaginatedFetchStore {
            inner: Arc::new(PaginatedInner {
                endpoint: self.endpoint.build()?,
                path,
                page_size: self.page_size,
                aggregate: self.aggregate,
                end_check: self.end_check,
                page: Store::new(0),
                reached_end: Store::new(false),
                loading_more: Store::new(false),
                generation: AtomicU64::new(0),
                continuing: AtomicBool::new(false),
                _params: PhantomData,
            }),
        })
    }
}
