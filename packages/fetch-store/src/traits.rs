//! Capability traits for remote-backed stores.
//!
//! They sit next to the core `Readable` / `Writable` / `Persistable`
//! capabilities, so app code can accept "anything fetchable" without naming
//! a concrete store type.

use async_trait::async_trait;

use crate::FetchError;

/// A store that can load its value from a remote endpoint.
#[async_trait]
pub trait Fetchable<T, P>: Send + Sync {
    /// Fresh fetch: the response replaces the value.
    async fn fetch(&self, params: P) -> Result<T, FetchError>;

    fn data(&self) -> T;

    fn error(&self) -> Option<FetchError>;

    fn is_loading(&self) -> bool;

    fn is_fetched(&self) -> bool;
}

/// A fetchable store that loads its value one page at a time.
#[async_trait]
pub trait Paginated<T, P>: Fetchable<T, P> {
    /// Fetch the next page and aggregate it into the value.
    ///
    /// Returns the aggregated value. Once the end has been reached this is a
    /// no-op returning the current value.
    async fn load_more(&self, params: P) -> Result<T, FetchError>;

    /// Index of the last page loaded.
    fn page(&self) -> u32;

    fn has_reached_end(&self) -> bool;

    fn is_loading_more(&self) -> bool;
}
