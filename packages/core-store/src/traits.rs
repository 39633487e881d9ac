//! Capability traits: Readable, Writable, Persistable.
//!
//! Concrete stores are built by combining capabilities rather than by
//! extending a base type. `Store<T>` implements all three; `Selector<T, U>`
//! is `Readable<U>`; the fetch crate adds `Fetchable` and `Paginated`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::selector::Selector;
use crate::store::{Observer, Store, Subscription};
use crate::Error;

/// The subscribe/snapshot pair a UI binding consumes.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Box<dyn Readable<T>>`.
pub trait Readable<T>: Send + Sync {
    /// The current (possibly projected) value.
    fn snapshot(&self) -> T;

    /// Register `observer` for every later value.
    fn observe(&self, observer: Observer<T>) -> Subscription;
}

/// Write access to a single value.
pub trait Writable<T>: Readable<T> {
    fn set(&self, value: T);

    /// Compute the next value from the current one.
    ///
    /// The default reads then writes; `Store` overrides this with an
    /// atomic version.
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
        Self: Sized,
    {
        let next = f(&self.snapshot());
        self.set(next);
    }
}

/// Lifecycle of a persistence binding.
#[async_trait]
pub trait Persistable: Send + Sync {
    /// `true` when there is nothing (left) to load.
    fn is_hydrated(&self) -> bool;

    /// Resolve once hydration has settled.
    async fn hydrated(&self);

    /// Remove the persisted blob, keeping the in-memory value.
    fn clear(&self);

    /// Wait for queued persistence writes to settle.
    async fn flush(&self) -> Result<(), Error>;
}

impl<T: Clone + Send + Sync + 'static> Readable<T> for Store<T> {
    fn snapshot(&self) -> T {
        self.get()
    }

    fn observe(&self, observer: Observer<T>) -> Subscription {
        Store::observe(self, observer)
    }
}

impl<T: Clone + Send + Sync + 'static> Writable<T> for Store<T> {
    fn set(&self, value: T) {
        Store::set(self, value)
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
        Self: Sized,
    {
        Store::update(self, f)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Persistable for Store<T> {
    fn is_hydrated(&self) -> bool {
        Store::is_hydrated(self)
    }

    async fn hydrated(&self) {
        Store::hydrated(self).await
    }

    fn clear(&self) {
        Store::clear(self)
    }

    async fn flush(&self) -> Result<(), Error> {
        Store::flush(self).await
    }
}

impl<T, U> Readable<U> for Selector<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: 'static,
{
    fn snapshot(&self) -> U {
        Selector::snapshot(self)
    }

    fn observe(&self, observer: Observer<U>) -> Subscription {
        self.subscribe(move |value| observer(value))
    }
}

impl<T, R: Readable<T> + ?Sized> Readable<T> for Arc<R> {
    fn snapshot(&self) -> T {
        self.as_ref().snapshot()
    }

    fn observe(&self, observer: Observer<T>) -> Subscription {
        self.as_ref().observe(observer)
    }
}
