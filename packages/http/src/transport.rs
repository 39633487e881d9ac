//! reqwest-backed [`Transport`].

use std::str::FromStr;

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use stowage_fetch_store::{FetchError, Method, Request, Transport};

use crate::{Error, HttpConfig};

/// Sends store requests over HTTP.
///
/// Read verbs carry their params as a query string, write verbs as a JSON
/// body. A non-2xx status is a [`FetchError::Status`]; an empty success body
/// comes back as `null`.
///
/// # Example
///
/// ```rust,ignore
/// let transport = HttpTransport::new(HttpConfig::from_env()?)?;
/// let order = FetchStore::<Order, ()>::builder(transport)
///     .path("/orders/42")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            headers.insert(HeaderName::from_str(name)?, HeaderValue::from_str(value)?);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Shorthand for a default configuration at `base_url`.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::new(HttpConfig::new(base_url)?)
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::GET => reqwest::Method::GET,
        Method::POST => reqwest::Method::POST,
        Method::PUT => reqwest::Method::PUT,
        Method::PATCH => reqwest::Method::PATCH,
        Method::DELETE => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Value, FetchError> {
        let url = self
            .config
            .url_for(&request.path)
            .map_err(FetchError::transport)?;
        tracing::debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self.client.request(to_reqwest(request.method), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(FetchError::transport)?;
        let status = response.status();
        let text = response.text().await.map_err(FetchError::transport)?;

        if !status.is_success() {
            let message = match text.trim() {
                "" => status.canonical_reason().unwrap_or("Unknown").to_string(),
                body => body.to_string(),
            };
            return Err(FetchError::Status {
                path: request.path,
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| FetchError::Decode {
            path: request.path,
            message: e.to_string(),
        })
    }
}
