//! HTTP transport for Stowage fetch stores.
//!
//! [`HttpTransport`] implements `stowage_fetch_store::Transport` on top of
//! an async `reqwest` client. Configure it with [`HttpConfig`], directly or
//! from the environment:
//!
//! ```rust,ignore
//! // STOWAGE_BASE_URL=https://api.example.com/v1
//! // STOWAGE_HTTP_TIMEOUT_SECS=10
//! let transport = HttpTransport::new(HttpConfig::from_env()?)?;
//! ```

pub mod config;
pub mod error;
pub mod transport;

pub use config::HttpConfig;
pub use error::Error;
pub use transport::HttpTransport;
