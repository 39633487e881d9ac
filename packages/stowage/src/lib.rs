//! Stowage: reactive value stores for client applications.
//!
//! A store holds one value, tells observers when it changes, and can
//! optionally persist that value and load it from a remote endpoint. The
//! pieces live in layered crates, re-exported here:
//!
//! - [`core`]: `Store`, `Selector`, `Registry`, `SingleFlight`, capability traits
//! - [`fetch`]: `FetchStore`, `PaginatedFetchStore`, `MutationStore`, queries
//! - [`storage`]: `MemoryStorage` and `JsonFileStorage` persistence backends
//! - [`http`]: a reqwest-backed transport (feature `http`, on by default)
//!
//! App-specific stores are built by composition: hold the primitives you
//! need in a struct and add named accessors and mutators on top.
//!
//! # Example
//!
//! ```rust,ignore
//! use stowage::{FetchStore, QueryOptions, Registry, Store};
//! use stowage::http::HttpTransport;
//!
//! struct Orders {
//!     list: FetchStore<Vec<Order>>,
//!     selected: Store<Vec<String>>,
//! }
//!
//! let registry = Registry::new();
//! let transport = HttpTransport::with_base_url("https://api.example.com")?;
//! let list = registry.get_or_try_insert_with("orders", || {
//!     FetchStore::builder(transport).path("/orders").build()
//! })?;
//! ```

pub use stowage_core_store as core;
pub use stowage_fetch_store as fetch;
pub use stowage_json_store as storage;

#[cfg(feature = "http")]
pub use stowage_http as http;

pub use stowage_core_store::{
    Error, Flight, KeyValueStorage, Persistable, ReadState, Readable, Registry, Reporter,
    Selector, SingleFlight, Store, StoreBuilder, Subscription, TracingReporter, Writable,
};
pub use stowage_fetch_store::{
    FetchError, FetchKind, FetchStore, Fetchable, Method, MutationStore, PageData, Paginated,
    PaginatedFetchStore, PaginatedQuery, Query, QueryOptions, Request, Transport, Trigger,
};
pub use stowage_json_store::{JsonFileStorage, MemoryStorage};
