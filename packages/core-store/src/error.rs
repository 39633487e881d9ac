//! Error types for the core store layer.
//!
//! Every variant carries owned strings so errors can be cloned into error
//! sub-stores and replayed to every reader of a settled operation.

/// Errors raised by stores, their persistence binding, and the registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The storage collaborator failed to save, load, or remove a blob.
    #[error("storage error for key '{key}': {message}")]
    Storage { key: String, message: String },

    /// A value could not be serialized for persistence.
    #[error("failed to encode value for key '{key}': {message}")]
    Encode { key: String, message: String },

    /// A persisted blob could not be parsed back into the store's value type.
    #[error("failed to decode value for key '{key}': {message}")]
    Decode { key: String, message: String },

    /// A persisted store was built outside of a Tokio runtime.
    #[error("no async runtime available: {message}")]
    NoRuntime { message: String },

    /// A registry key already holds an instance of a different type.
    #[error("registry entry '{key}' holds a different store type")]
    RegistryTypeMismatch { key: String },

    /// The persistence worker for a store is gone.
    #[error("persistence worker for key '{key}' has shut down")]
    PersistenceClosed { key: String },
}

impl Error {
    pub fn storage(key: impl Into<String>, message: impl ToString) -> Self {
        Error::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_display() {
        let e = Error::storage("orders", "disk full");
        let display = format!("{}", e);
        assert!(display.contains("orders"));
        assert!(display.contains("disk full"));
    }

    #[test]
    fn decode_error_display() {
        let e = Error::Decode {
            key: "cart".to_string(),
            message: "expected array".to_string(),
        };
        assert_eq!(
            format!("{}", e),
            "failed to decode value for key 'cart': expected array"
        );
    }

    #[test]
    fn registry_mismatch_display() {
        let e = Error::RegistryTypeMismatch {
            key: "orders".to_string(),
        };
        assert!(format!("{}", e).contains("different store type"));
    }

    #[test]
    fn errors_are_cloneable() {
        let e = Error::NoRuntime {
            message: "not inside tokio".to_string(),
        };
        assert_eq!(e.clone(), e);
    }
}
