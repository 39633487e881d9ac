//! Persistence binding for stores.
//!
//! A persisted store owns one worker task. The worker first hydrates the
//! store from its [`KeyValueStorage`], then drains a queue of saves and
//! removals in the order they were issued. `set` only enqueues, so it never
//! waits on storage.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::report::SharedReporter;
use crate::store::{Inner, Store};
use crate::Error;

/// Persistent key-value storage collaborator.
///
/// Blobs are opaque text. Stores write JSON, but a storage backend must not
/// depend on that.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn KeyValueStorage>`.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Persist `blob` under `key`, replacing any previous blob.
    async fn save(&self, key: &str, blob: String) -> Result<(), Error>;

    /// Load the blob under `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing was ever saved under this key.
    /// * `Ok(Some(blob))` - The last saved blob.
    /// * `Err(Error)` - The backend failed.
    async fn load(&self, key: &str) -> Result<Option<String>, Error>;

    /// Remove the blob under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), Error>;
}

#[async_trait]
impl<S: KeyValueStorage + ?Sized> KeyValueStorage for Arc<S> {
    async fn save(&self, key: &str, blob: String) -> Result<(), Error> {
        self.as_ref().save(key, blob).await
    }

    async fn load(&self, key: &str) -> Result<Option<String>, Error> {
        self.as_ref().load(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.as_ref().remove(key).await
    }
}

/// Text encoding for persisted values, fixed when `persist` is configured so
/// that stores of non-serializable types can still be built without it.
pub(crate) struct Codec<T> {
    encode: fn(&T) -> serde_json::Result<String>,
    decode: fn(&str) -> serde_json::Result<T>,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Codec<T> {}

impl<T: Serialize + DeserializeOwned> Codec<T> {
    pub(crate) fn json() -> Self {
        Codec {
            encode: |value: &T| serde_json::to_string(value),
            decode: |blob: &str| serde_json::from_str(blob),
        }
    }
}

/// Everything `StoreBuilder::persist` captures.
pub(crate) struct PersistConfig<T> {
    pub(crate) key: String,
    pub(crate) storage: Arc<dyn KeyValueStorage>,
    pub(crate) codec: Codec<T>,
}

pub(crate) enum Command<T> {
    Save(T),
    Remove,
    Flush(oneshot::Sender<()>),
}

/// Handle held by a persisted store: its key and the worker's queue.
pub(crate) struct Persistence<T> {
    pub(crate) key: String,
    queue: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Persistence<T> {
    pub(crate) fn channel(key: String) -> (Self, mpsc::UnboundedReceiver<Command<T>>) {
        let (queue, rx) = mpsc::unbounded_channel();
        (Persistence { key, queue }, rx)
    }

    fn send(&self, command: Command<T>) -> Result<(), Error> {
        self.queue
            .send(command)
            .map_err(|_| Error::PersistenceClosed {
                key: self.key.clone(),
            })
    }

    pub(crate) fn save(&self, value: T) -> Result<(), Error> {
        self.send(Command::Save(value))
    }

    pub(crate) fn remove(&self) -> Result<(), Error> {
        self.send(Command::Remove)
    }

    pub(crate) async fn flush(&self) -> Result<(), Error> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush(ack))?;
        done.await.map_err(|_| Error::PersistenceClosed {
            key: self.key.clone(),
        })
    }
}

/// The worker loop: hydrate once, then apply queued commands in order.
///
/// Holds only a weak reference to the store so that dropping every handle
/// closes the queue and ends the task.
pub(crate) async fn run_worker<T>(
    store: Weak<Inner<T>>,
    hydration: Store<bool>,
    config: PersistConfig<T>,
    reporter: SharedReporter,
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
) where
    T: Clone + Send + Sync + 'static,
{
    let PersistConfig {
        key,
        storage,
        codec,
    } = config;

    hydrate(&store, &key, storage.as_ref(), codec, &reporter).await;
    hydration.set(true);

    while let Some(command) = commands.recv().await {
        match command {
            Command::Save(value) => {
                let blob = match (codec.encode)(&value) {
                    Ok(blob) => blob,
                    Err(e) => {
                        reporter.report(&Error::Encode {
                            key: key.clone(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                };
                if let Err(e) = storage.save(&key, blob).await {
                    reporter.report(&e);
                }
            }
            Command::Remove => {
                if let Err(e) = storage.remove(&key).await {
                    reporter.report(&e);
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    tracing::debug!(key = %key, "persistence worker stopped");
}

async fn hydrate<T>(
    store: &Weak<Inner<T>>,
    key: &str,
    storage: &dyn KeyValueStorage,
    codec: Codec<T>,
    reporter: &SharedReporter,
) where
    T: Clone + Send + Sync + 'static,
{
    let blob = match storage.load(key).await {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            tracing::debug!(key = %key, "nothing persisted, keeping default");
            return;
        }
        Err(e) => {
            reporter.report(&e);
            return;
        }
    };

    let value = match (codec.decode)(&blob) {
        Ok(value) => value,
        Err(e) => {
            reporter.report(&Error::Decode {
                key: key.to_string(),
                message: e.to_string(),
            });
            return;
        }
    };

    let Some(inner) = store.upgrade() else {
        return;
    };
    if Store::from_inner(inner).apply_hydrated(value) {
        tracing::debug!(key = %key, "hydrated from storage");
    } else {
        tracing::debug!(key = %key, "local write landed first, persisted value discarded");
    }
}
