//! HTTP request descriptors and status interpretation.
//!
//! # Design
//! An `HttpRequest` describes one exchange as plain data: a fully composed
//! locator, a verb, a header map and an already-encoded body. Encoding happens
//! when the descriptor is built, so a body that cannot be serialized is
//! reported before any connection is opened.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Header name to value. Names are unique; a later insert replaces the
/// earlier value.
pub type Headers = BTreeMap<String, String>;

/// How the executor interprets the status code of a response that arrived
/// without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Every response is a success, whatever its status code.
    #[default]
    Legacy,
    /// Only 200..=299 is a success; anything else is
    /// `ApiError::UnsuccessfulResponse`.
    Strict,
}

impl StatusPolicy {
    pub fn accepts(&self, status: u16) -> bool {
        match self {
            StatusPolicy::Legacy => true,
            StatusPolicy::Strict => (200..=299).contains(&status),
        }
    }
}

/// One network exchange described as plain data.
///
/// Built per call and consumed by `ApiSession::execute`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub locator: Url,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, locator: Url) -> Self {
        Self {
            method,
            locator,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Serialize `body` as the JSON payload of this request.
    ///
    /// Sets `Content-Type: application/json` unless the caller already chose
    /// a content type.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let bytes = serde_json::to_vec(body).map_err(ApiError::Encoding)?;
        let has_content_type = self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            self.headers
                .insert("Content-Type".to_string(), "application/json".to_string());
        }
        self.body = Some(bytes);
        Ok(self)
    }
}
