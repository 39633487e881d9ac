//! Stowage core: observable value stores.
//!
//! This layer holds values and tells observers about them:
//! - `Store<T>`: one value, its observers, and an optional persistence binding
//! - `Selector<T, U>`: a store narrowed through a projection
//! - `Registry`: one shared instance per key
//! - `SingleFlight`: one in-flight operation per key, readable without blocking
//!
//! Remote data (fetching, pagination, mutations) lives one layer up, in
//! `stowage-fetch-store`.
//!
//! # Example
//!
//! ```rust
//! use stowage_core_store::{Registry, Store};
//!
//! let registry = Registry::new();
//! let selected = registry
//!     .get_or_insert_with("selected-ids", || Store::new(Vec::<String>::new()))
//!     .unwrap();
//!
//! let count = selected.select(|ids| ids.len());
//! selected.update(|ids| {
//!     let mut ids = ids.clone();
//!     ids.push("order-42".to_string());
//!     ids
//! });
//! assert_eq!(count.snapshot(), 1);
//! ```
//!
//! # Persistence
//!
//! A store built with `persist(key, storage)` hydrates from the storage
//! backend in the background and writes every later value back, without ever
//! blocking `set`:
//!
//! ```rust,ignore
//! let cart = Store::builder(Cart::default())
//!     .persist("cart", storage)
//!     .build()?;
//!
//! cart.hydrated().await;
//! ```

mod error;
mod persist;
mod registry;
mod report;
mod selector;
mod single_flight;
mod store;
mod traits;

pub use error::Error;
pub use persist::KeyValueStorage;
pub use registry::Registry;
pub use report::{Reporter, SharedReporter, TracingReporter};
pub use selector::Selector;
pub use single_flight::{Abandoned, Flight, ReadState, SingleFlight};
pub use store::{Observer, Store, StoreBuilder, Subscription, SubscriptionId};
pub use traits::{Persistable, Readable, Writable};
