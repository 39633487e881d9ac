//! Scriptable transport for tests.
//!
//! Enabled in this crate's own tests and, for downstream crates, through the
//! `test-utils` feature.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{FetchError, Request, Transport};

type Handler = Arc<dyn Fn(&Request) -> Result<Value, FetchError> + Send + Sync>;

/// A transport that answers from canned responses.
///
/// Lookup order: forced failure, handler, per-path response, 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Responses keyed by request path.
    responses: Arc<Mutex<HashMap<String, Result<Value, FetchError>>>>,
    /// Computes a response from the full request when set.
    handler: Arc<Mutex<Option<Handler>>>,
    /// Every request seen, in order.
    recorded_requests: Arc<Mutex<Vec<Request>>>,
    /// Fails every request with this message when set.
    failure: Arc<Mutex<Option<String>>>,
    /// Sleeps this long before answering.
    delay: Arc<Mutex<Option<Duration>>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `path` with `body`.
    pub fn with_response(self, path: impl Into<String>, body: Value) -> Self {
        lock(&self.responses).insert(path.into(), Ok(body));
        self
    }

    /// Fail requests for `path` with `error`.
    pub fn with_error(self, path: impl Into<String>, error: FetchError) -> Self {
        lock(&self.responses).insert(path.into(), Err(error));
        self
    }

    /// Compute every response from the request.
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Value, FetchError> + Send + Sync + 'static,
    {
        *lock(&self.handler) = Some(Arc::new(handler));
        self
    }

    /// Fail every request with a transport error.
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        *lock(&self.failure) = Some(message.into());
        self
    }

    /// Delay every response.
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = Some(delay);
        self
    }

    /// Start failing every request on an existing mock.
    pub fn set_failure(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    /// Replace the response for `path` on an existing mock.
    pub fn respond(&self, path: impl Into<String>, body: Value) {
        lock(&self.responses).insert(path.into(), Ok(body));
    }

    pub fn recorded_requests(&self) -> Vec<Request> {
        lock(&self.recorded_requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.recorded_requests).len()
    }

    pub fn clear_recorded(&self) {
        lock(&self.recorded_requests).clear();
    }

    pub fn not_found(path: &str) -> FetchError {
        FetchError::Status {
            path: path.to_string(),
            status: 404,
            message: "Not Found".to_string(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Value, FetchError> {
        lock(&self.recorded_requests).push(request.clone());

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = lock(&self.failure).clone() {
            return Err(FetchError::Transport { message });
        }

        let handler = lock(&self.handler).clone();
        if let Some(handler) = handler {
            return handler(&request);
        }

        match lock(&self.responses).get(&request.path) {
            Some(response) => response.clone(),
            None => Err(Self::not_found(&request.path)),
        }
    }
}
