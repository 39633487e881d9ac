//! Transport configuration.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use url::Url;

use crate::Error;

/// Environment variable holding the base URL.
pub const BASE_URL_VAR: &str = "STOWAGE_BASE_URL";
/// Environment variable holding the request timeout in whole seconds.
pub const TIMEOUT_VAR: &str = "STOWAGE_HTTP_TIMEOUT_SECS";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how an [`HttpTransport`](crate::HttpTransport) sends requests.
///
/// Request paths are resolved against `base_url`, so `/orders/42` with a
/// base of `https://api.example.com/v1` goes to
/// `https://api.example.com/v1/orders/42`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub base_url: Url,
    pub timeout: Duration,
    /// Sent with every request; per-request headers override them.
    pub headers: BTreeMap<String, String>,
}

impl HttpConfig {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                message: format!("{} cannot be used as a base URL", base_url),
            });
        }
        Ok(Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
        })
    }

    /// Read `STOWAGE_BASE_URL` and, optionally, `STOWAGE_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = env::var(BASE_URL_VAR).map_err(|e| Error::Config {
            message: format!("{}: {}", BASE_URL_VAR, e),
        })?;
        let mut config = Self::new(&base_url)?;

        if let Ok(secs) = env::var(TIMEOUT_VAR) {
            let secs: u64 = secs.trim().parse().map_err(|e| Error::Config {
                message: format!("{}: {}", TIMEOUT_VAR, e),
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Absolute URL for a request path.
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
    }
}
