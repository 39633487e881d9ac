use std::{io, path};

use stowage_core_store::Error as StoreError;

/// Errors raised while opening a storage backend.
///
/// Per-key failures during `save` / `load` / `remove` surface as
/// [`stowage_core_store::Error::Storage`] instead, so the persistence worker
/// can report them uniformly.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("root path {path:?} is not usable: {error}")]
    RootPathInvalid { path: path::PathBuf, error: io::Error },
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        match &e {
            StorageError::RootPathInvalid { path, .. } => {
                StoreError::storage(path.display().to_string(), e.to_string())
            }
        }
    }
}
