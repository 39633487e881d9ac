//! Stowage fetch stores: values that come from a remote endpoint.
//!
//! Built on `stowage-core-store`, this layer adds the request lifecycle:
//! - `FetchStore<T, P>`: one value plus `loading`, `error` and `fetched` flags
//! - `PaginatedFetchStore<T, P>`: page cursor, end-of-data flag, aggregation
//! - `MutationStore<T, P>`: write verbs, never fetched on mount
//! - `Trigger` / `Query`: mount-time bindings for UI code
//!
//! Requests go through the [`Transport`] seam. `stowage-http` provides a
//! reqwest-backed one; tests use [`mock::MockTransport`].
//!
//! # Example
//!
//! ```rust,ignore
//! let orders = PaginatedFetchStore::<Vec<Order>, ()>::builder(transport)
//!     .path("/orders")
//!     .page_size(20)
//!     .build()?;
//!
//! let mut query = orders.query(QueryOptions::default())?;
//! query.mounted().await;
//! while !query.has_reached_end() {
//!     query.load_more(()).await?;
//! }
//! ```

mod endpoint;
mod error;
mod fetch;
mod mutation;
mod page;
mod paginated;
mod query;
mod request;
mod traits;
mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use endpoint::{FetchKind, SuccessHook};
pub use error::FetchError;
pub use fetch::{FetchStore, FetchStoreBuilder, PathSpec};
pub use mutation::{MutationStore, MutationStoreBuilder};
pub use page::{short_page, PageData};
pub use paginated::{
    Aggregate, EndCheck, PagePath, PaginatedFetchStore, PaginatedFetchStoreBuilder,
    DEFAULT_PAGE_SIZE,
};
pub use query::{PaginatedQuery, Query, QueryOptions, Trigger, TriggerOptions};
pub use request::{Method, Request};
pub use traits::{Fetchable, Paginated};
pub use transport::Transport;
