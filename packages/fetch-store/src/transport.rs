//! The network collaborator seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{FetchError, Request};

/// Sends requests and returns their structured response body.
///
/// The base URL is the transport's business; requests carry relative paths.
/// A body-less success comes back as `Value::Null`.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Value, FetchError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Value, FetchError> {
        self.as_ref().send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, request: Request) -> Result<Value, FetchError> {
        self.as_ref().send(request).await
    }
}
