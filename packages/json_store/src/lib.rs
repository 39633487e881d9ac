//! Storage backends for persisted Stowage stores.
//!
//! - [`MemoryStorage`]: a shared in-process map, handy in tests
//! - [`JsonFileStorage`]: one JSON file per key under a root directory
//!
//! Both implement [`stowage_core_store::KeyValueStorage`].

mod error;
pub mod in_memory;
pub mod local_disk;

pub use error::StorageError;
pub use in_memory::MemoryStorage;
pub use local_disk::JsonFileStorage;
