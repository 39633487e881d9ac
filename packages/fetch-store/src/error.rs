//! Error types for fetch operations.

use stowage_core_store::{Abandoned, Error as StoreError};

/// Failures of fetch, load-more, and mutate operations.
///
/// Cloneable so the same error can sit in a store's error sub-store, be
/// returned to the caller, and be replayed to every single-flight reader.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {path}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },

    /// The response body did not match the store's value type.
    #[error("failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },

    /// The response body was empty where a value was expected.
    #[error("empty response from {path}")]
    EmptyResponse { path: String },

    /// Request parameters could not be encoded.
    #[error("invalid request params: {message}")]
    Params { message: String },

    /// A store builder was missing required settings.
    #[error("invalid store configuration: {message}")]
    Config { message: String },

    /// A store-level failure, e.g. building a persisted store outside a runtime.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The operation behind a suspending read never settled.
    #[error(transparent)]
    Abandoned(#[from] Abandoned),
}

impl FetchError {
    pub fn transport(message: impl ToString) -> Self {
        FetchError::Transport {
            message: message.to_string(),
        }
    }
}
