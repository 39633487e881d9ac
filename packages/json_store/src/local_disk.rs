//! Storage backend keeping one JSON file per key under a root directory.

use std::io::ErrorKind;
use std::{fs, io, path};

use async_trait::async_trait;
use stowage_core_store::{Error, KeyValueStorage};

use crate::StorageError;

const EXTENSION: &str = "json";

/// Blobs as `<root>/<encoded key>.json`.
///
/// Keys are encoded to file-name-safe form: ASCII letters, digits, `-` and
/// `_` pass through, every other byte becomes `%XX`. Writes go to a
/// temporary file first and are renamed into place, so a crash mid-write
/// leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: path::PathBuf,
}

impl JsonFileStorage {
    /// Open storage rooted at `root`, which must be a writable directory.
    pub fn new(root: impl Into<path::PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        let attr = fs::metadata(&root).map_err(|error| StorageError::RootPathInvalid {
            path: root.clone(),
            error,
        })?;

        if !attr.is_dir() {
            return Err(StorageError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root path must be a directory."),
            });
        }

        if attr.permissions().readonly() {
            return Err(StorageError::RootPathInvalid {
                path: root,
                error: io::Error::other("Root directory must be writable"),
            });
        }

        match root.canonicalize() {
            Ok(root) => Ok(JsonFileStorage { root }),
            Err(error) => Err(StorageError::RootPathInvalid { path: root, error }),
        }
    }

    pub fn root(&self) -> &path::Path {
        &self.root
    }

    /// The file a key is stored in.
    pub fn file_path(&self, key: &str) -> path::PathBuf {
        self.root.join(format!("{}.{}", encode_key(key), EXTENSION))
    }

    /// Keys with a stored blob, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let root = self.root.display().to_string();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::storage(&root, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(&root, e))?
        {
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if let Some(key) = decode_key(stem) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl KeyValueStorage for JsonFileStorage {
    async fn save(&self, key: &str, blob: String) -> Result<(), Error> {
        let target = self.file_path(key);
        let staging = target.with_extension(format!("{}.tmp", EXTENSION));
        tracing::debug!(path = %target.display(), "writing blob");

        tokio::fs::write(&staging, blob.as_bytes())
            .await
            .map_err(|e| Error::storage(key, e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| Error::storage(key, e))
    }

    async fn load(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.file_path(key);
        tracing::debug!(path = %path.display(), "reading blob");

        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(key, e)),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        match tokio::fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(key, e)),
        }
    }
}

fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_is_file_name_safe() {
        assert_eq!(encode_key("orders"), "orders");
        assert_eq!(encode_key("/orders/42"), "%2Forders%2F42");
        assert_eq!(encode_key("a.b c"), "a%2Eb%20c");
        assert_eq!(decode_key("%2Forders%2F42"), Some("/orders/42".to_string()));
        assert_eq!(decode_key(&encode_key("ünï")), Some("ünï".to_string()));
        assert_eq!(decode_key("%Z"), None);
    }

    #[test]
    fn root_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            JsonFileStorage::new(&missing),
            Err(StorageError::RootPathInvalid { .. })
        ));
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.json");
        fs::write(&file, "{}").unwrap();
        assert!(JsonFileStorage::new(&file).is_err());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path()).unwrap();

        storage
            .save("/orders/42", r#"{"id":"42"}"#.to_string())
            .await
            .unwrap();

        assert!(storage.file_path("/orders/42").exists());
        assert_eq!(
            storage.load("/orders/42").await.unwrap(),
            Some(r#"{"id":"42"}"#.to_string())
        );
        assert_eq!(storage.keys().await.unwrap(), vec!["/orders/42".to_string()]);
    }

    #[tokio::test]
    async fn overwrite_replaces_the_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path()).unwrap();

        storage.save("k", "1".to_string()).await.unwrap();
        storage.save("k", "2".to_string()).await.unwrap();

        assert_eq!(storage.load("k").await.unwrap(), Some("2".to_string()));
        assert_eq!(storage.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_key_loads_none_and_removes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path()).unwrap();

        assert_eq!(storage.load("absent").await.unwrap(), None);
        assert!(storage.remove("absent").await.is_ok());
    }

    #[tokio::test]
    async fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path()).unwrap();

        storage.save("k", "1".to_string()).await.unwrap();
        storage.remove("k").await.unwrap();

        assert!(!storage.file_path("k").exists());
        assert_eq!(storage.load("k").await.unwrap(), None);
    }
}
