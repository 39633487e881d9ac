use stowage_fetch_store::FetchError;

/// Failures setting up an [`HttpTransport`](crate::HttpTransport).
///
/// Request-time failures are [`FetchError`]s; these only happen while
/// building the configuration or the client.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl From<Error> for FetchError {
    fn from(error: Error) -> Self {
        FetchError::Config {
            message: error.to_string(),
        }
    }
}
