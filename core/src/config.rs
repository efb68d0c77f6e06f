//! Backend connection parameters.
//!
//! An `EndpointConfig` is created once at start-up and handed to the
//! `ApiSession` that owns it. It is never mutated afterwards; the `with_*`
//! helpers return modified copies.

use crate::error::ApiError;

/// Scheme, host, base path and error domain of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub scheme: String,
    /// Host name, optionally followed by `:port`.
    pub host: String,
    pub path: String,
    /// Identifier attached to every `ServiceError` and
    /// `UnsuccessfulResponse` produced for this backend.
    pub domain: String,
}

impl EndpointConfig {
    pub fn new(scheme: &str, host: &str, path: &str, domain: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            domain: domain.to_string(),
        }
    }

    /// The Parse backend that stores student locations.
    pub fn parse_api() -> Self {
        Self::new("https", "parse.udacity.com", "/parse/classes", "ParseClient")
    }

    /// The Udacity backend that handles sessions and public user data.
    pub fn udacity_api() -> Self {
        Self::new("https", "www.udacity.com", "/api", "UdacityClient")
    }

    pub fn with_scheme(&self, scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            ..self.clone()
        }
    }

    pub fn with_host(&self, host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..self.clone()
        }
    }
}

/// Application keys sent with every Parse request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCredentials {
    pub application_id: String,
    pub rest_api_key: String,
}

impl ParseCredentials {
    pub const APPLICATION_ID_VAR: &'static str = "PARSE_APPLICATION_ID";
    pub const REST_API_KEY_VAR: &'static str = "PARSE_REST_API_KEY";

    pub fn new(application_id: &str, rest_api_key: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            rest_api_key: rest_api_key.to_string(),
        }
    }

    /// Read the keys from `PARSE_APPLICATION_ID` and `PARSE_REST_API_KEY`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let read = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ApiError::MissingConfig(name.to_string()))
        };
        Ok(Self {
            application_id: read(Self::APPLICATION_ID_VAR)?,
            rest_api_key: read(Self::REST_API_KEY_VAR)?,
        })
    }
}
