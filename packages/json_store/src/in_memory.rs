//! Process-local storage backend.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use stowage_core_store::{Error, KeyValueStorage};

/// Blobs kept in a shared map.
///
/// Clones share the same map, so a test can hand one clone to a store and
/// inspect what was persisted through another. Also useful for rebuilding a
/// store against "the same disk" within one process.
///
/// # Example
///
/// ```rust
/// use stowage_json_store::MemoryStorage;
///
/// let storage = MemoryStorage::new();
/// storage.insert("cart", r#"{"items":[]}"#);
/// assert_eq!(storage.get("cart").as_deref(), Some(r#"{"items":[]}"#));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob directly, bypassing any store.
    pub fn insert(&self, key: impl Into<String>, blob: impl Into<String>) {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), blob.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = blobs.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn save(&self, key: &str, blob: String) -> Result<(), Error> {
        self.insert(key, blob);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.get(key))
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load("a").await.unwrap(), None);

        storage.save("a", "1".to_string()).await.unwrap();
        assert_eq!(storage.load("a").await.unwrap(), Some("1".to_string()));

        storage.remove("a").await.unwrap();
        assert_eq!(storage.load("a").await.unwrap(), None);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn removing_a_missing_key_is_fine() {
        let storage = MemoryStorage::new();
        assert!(storage.remove("never-written").await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_blobs() {
        let storage = MemoryStorage::new();
        let other = storage.clone();

        storage.save("b", "x".to_string()).await.unwrap();
        storage.save("a", "y".to_string()).await.unwrap();

        assert_eq!(other.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(other.len(), 2);
    }
}
