//! Error types for the On The Map API clients.
//!
//! # Design
//! Every failure of a network exchange surfaces as one `ApiError`. Backend
//! errors that carry a code and a message of their own are wrapped in a
//! `ServiceError`, tagged with the domain of the endpoint that produced it.

use std::fmt;

/// Errors returned by `ApiSession` and the clients built on it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// DNS, connection, TLS or timeout failure. No response was received.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request body could not be serialized to JSON.
    #[error("request body could not be encoded: {0}")]
    Encoding(#[source] serde_json::Error),

    /// The response status fell outside the accepted range.
    #[error("{domain}: unsuccessful response (HTTP {status})")]
    UnsuccessfulResponse { domain: String, status: u16 },

    /// The locator could not be composed into a usable address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The response payload could not be deserialized into the expected type.
    #[error("response body could not be decoded: {0}")]
    Decoding(#[source] serde_json::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A required configuration value was not set.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// `make_request` was called outside a Tokio runtime.
    #[error("no async runtime available to run the request")]
    NoRuntime,
}

/// A structured error carrying a status code, a description and the error
/// domain of the endpoint it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub domain: String,
    pub code: i64,
    pub description: String,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.domain, self.code, self.description)
    }
}

impl std::error::Error for ServiceError {}
