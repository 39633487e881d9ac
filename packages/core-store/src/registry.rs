//! Keyed registry of store instances.
//!
//! One instance per key for the life of the registry. The registry is an
//! explicit value: construct one (or put it in a `static OnceLock`) and hand
//! it to whatever builds stores.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::Error;

type Entry = Box<dyn Any + Send + Sync>;

/// Append-only map from key to a shared store handle.
///
/// Entries are cloned out on lookup, so registered types are handles
/// (`Store<T>`, `FetchStore<T, P>`, ...) whose clones share one instance.
///
/// Creation runs while the registry lock is held: when several callers race
/// the first lookup of a key, exactly one `make` runs and every caller gets
/// its result. `make` must therefore not use the same registry.
///
/// # Example
///
/// ```rust
/// use stowage_core_store::{Registry, Store};
///
/// let registry = Registry::new();
/// let a = registry.get_or_insert_with("selected", || Store::new(Vec::<String>::new())).unwrap();
/// let b = registry.get_or_insert_with("selected", || Store::new(Vec::<String>::new())).unwrap();
///
/// a.set(vec!["order-1".to_string()]);
/// assert_eq!(b.get(), vec!["order-1".to_string()]);
/// ```
#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance under `key`, creating it with `make` on first access.
    pub fn get_or_insert_with<S, F>(&self, key: &str, make: F) -> Result<S, Error>
    where
        S: Clone + Send + Sync + 'static,
        F: FnOnce() -> S,
    {
        self.get_or_try_insert_with(key, || Ok::<S, Error>(make()))
    }

    /// Like [`Registry::get_or_insert_with`] for fallible constructors.
    ///
    /// Nothing is registered when `make` fails. Any error type that a
    /// registry [`Error`] converts into works, e.g. the fetch crate's.
    pub fn get_or_try_insert_with<S, E, F>(&self, key: &str, make: F) -> Result<S, E>
    where
        S: Clone + Send + Sync + 'static,
        E: From<Error>,
        F: FnOnce() -> Result<S, E>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get(key) {
            return entry
                .downcast_ref::<S>()
                .cloned()
                .ok_or_else(|| {
                    E::from(Error::RegistryTypeMismatch {
                        key: key.to_string(),
                    })
                });
        }

        let instance = make()?;
        entries.insert(key.to_string(), Box::new(instance.clone()));
        tracing::debug!(key, "registered store");
        Ok(instance)
    }

    /// The instance under `key`, if present and of type `S`.
    pub fn get<S>(&self, key: &str) -> Option<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).and_then(|e| e.downcast_ref::<S>()).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
