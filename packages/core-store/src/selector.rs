//! Projected views of a store.

use std::sync::Arc;

use crate::store::{Store, Subscription};

type Projection<T, U> = Arc<dyn Fn(&T) -> U + Send + Sync>;

/// A store seen through a pure projection.
///
/// Exposes the same subscribe/snapshot pair as [`Store`], but every value
/// passes through the projection first. There is no memoization: observers
/// fire on every write to the underlying store, even when the projected value
/// is unchanged.
pub struct Selector<T, U> {
    store: Store<T>,
    project: Projection<T, U>,
}

impl<T, U> Clone for Selector<T, U> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            project: Arc::clone(&self.project),
        }
    }
}

impl<T, U> Selector<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: 'static,
{
    pub(crate) fn new<F>(store: Store<T>, projection: F) -> Self
    where
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        Self {
            store,
            project: Arc::new(projection),
        }
    }

    /// The projected current value.
    pub fn snapshot(&self) -> U {
        self.store.read(|value| (self.project)(value))
    }

    /// Same as [`Selector::snapshot`].
    pub fn get(&self) -> U {
        self.snapshot()
    }

    /// Register `observer` for the projected value of every later write.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&U) + Send + Sync + 'static,
    {
        let project = Arc::clone(&self.project);
        self.store.subscribe(move |value| observer(&project(value)))
    }

    /// Narrow further.
    pub fn select<V, F>(&self, projection: F) -> Selector<T, V>
    where
        F: Fn(&U) -> V + Send + Sync + 'static,
        V: 'static,
    {
        let project = Arc::clone(&self.project);
        Selector::new(self.store.clone(), move |value: &T| projection(&project(value)))
    }

    /// The store this selector reads from.
    pub fn store(&self) -> &Store<T> {
        &self.store
    }
}
