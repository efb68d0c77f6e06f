//! Locator building and request execution for one backend.
//!
//! # Design
//! `ApiSession` owns an immutable `EndpointConfig`, a pooled transport and
//! the cookie jar that transport writes to. `build_locator` composes
//! addresses deterministically; `execute` performs exactly one round trip per
//! call with no retry, bounded by the session timeout. `make_request` is the
//! callback form of `execute`: the handler is an `FnOnce` moved into a single
//! spawned task, so it runs exactly once. Sessions are cheap to clone and are
//! passed explicitly to the clients that need them.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::EndpointConfig;
use crate::cookies::{Cookie, CookieJar};
use crate::error::{ApiError, ServiceError};
use crate::http::{Headers, HttpMethod, HttpRequest, StatusPolicy};

/// Result of one network exchange: the raw payload or the reason there is
/// none.
pub type Outcome = Result<Vec<u8>, ApiError>;

/// Upper bound on one exchange, from connect to the last body byte.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ApiSession {
    config: Arc<EndpointConfig>,
    http: reqwest::Client,
    cookies: Arc<CookieJar>,
    status_policy: StatusPolicy,
    timeout: Duration,
}

impl ApiSession {
    pub fn new(config: EndpointConfig) -> Result<Self, ApiError> {
        let cookies = Arc::new(CookieJar::new());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
            cookies,
            status_policy: StatusPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Fail any exchange that has not completed within `timeout` with a
    /// `Transport` error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Compose `scheme://host` + base path + `method` + `path_extension`,
    /// followed by `parameters` as a query string in the order given.
    ///
    /// Duplicate parameter names are kept. No parameters means no `?`. A `.`
    /// or `..` segment anywhere in the path is rejected, so a caller-supplied
    /// extension can never climb out of the base path.
    pub fn build_locator<K, V>(
        &self,
        method: Option<&str>,
        path_extension: Option<&str>,
        parameters: &[(K, V)],
    ) -> Result<Url, ApiError>
    where
        K: AsRef<str>,
        V: Display,
    {
        let config = &self.config;
        let origin = format!("{}://{}", config.scheme, config.host);
        let mut locator = Url::parse(&origin)
            .map_err(|e| ApiError::InvalidAddress(format!("{origin}: {e}")))?;

        let bare_origin = locator.has_host()
            && locator.path() == "/"
            && locator.query().is_none()
            && locator.fragment().is_none()
            && locator.username().is_empty()
            && locator.password().is_none();
        if !bare_origin {
            return Err(ApiError::InvalidAddress(format!(
                "{origin}: host must not carry a path, query or credentials"
            )));
        }

        let path = format!(
            "{}{}{}",
            config.path,
            method.unwrap_or_default(),
            path_extension.unwrap_or_default()
        );
        if !path.is_empty() && !path.starts_with('/') {
            return Err(ApiError::InvalidAddress(format!(
                "path {path:?} must start with '/'"
            )));
        }
        if path.split(['/', '\\']).any(is_dot_segment) {
            return Err(ApiError::InvalidAddress(format!(
                "path {path:?} must not contain dot segments"
            )));
        }
        locator.set_path(&path);

        if !parameters.is_empty() {
            let mut query = locator.query_pairs_mut();
            for (name, value) in parameters {
                query.append_pair(name.as_ref(), &value.to_string());
            }
        }

        Ok(locator)
    }

    /// Perform one round trip and return the raw response payload.
    pub async fn execute(&self, request: HttpRequest) -> Outcome {
        self.execute_with_status(request).await.map(|(_, payload)| payload)
    }

    /// Like `execute`, but also returns the response status for callers that
    /// interpret error bodies themselves.
    pub async fn execute_with_status(&self, request: HttpRequest) -> Result<(u16, Vec<u8>), ApiError> {
        let HttpRequest {
            method,
            locator,
            headers,
            body,
        } = request;

        tracing::debug!(%method, %locator, "dispatching request");
        let mut builder = self
            .http
            .request(method.into(), locator.clone())
            .timeout(self.timeout);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(%method, %locator, error = %e, "transport failure");
            ApiError::Transport(e)
        })?;

        let status = response.status().as_u16();
        let payload = response.bytes().await.map_err(|e| {
            tracing::warn!(%method, %locator, error = %e, "failed to read response body");
            ApiError::Transport(e)
        })?;
        tracing::debug!(%method, %locator, status, bytes = payload.len(), "request completed");

        if !self.status_policy.accepts(status) {
            tracing::warn!(%method, %locator, status, "unsuccessful response");
            return Err(ApiError::UnsuccessfulResponse {
                domain: self.config.domain.clone(),
                status,
            });
        }

        Ok((status, payload.to_vec()))
    }

    /// Start one exchange in the background and hand its outcome to
    /// `handler`.
    ///
    /// A body that cannot be encoded is reported to `handler` without any
    /// request being sent. Outside a Tokio runtime nothing is spawned:
    /// `handler` receives `ApiError::NoRuntime` immediately and the same
    /// error is returned.
    pub fn make_request<B, F>(
        &self,
        locator: Url,
        method: HttpMethod,
        headers: Option<Headers>,
        body: Option<&B>,
        handler: F,
    ) -> Result<JoinHandle<()>, ApiError>
    where
        B: Serialize + ?Sized,
        F: FnOnce(Outcome) + Send + 'static,
    {
        let request = HttpRequest::new(method, locator).headers(headers.unwrap_or_default());
        let request = match body {
            Some(body) => request.json(body),
            None => Ok(request),
        };

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(%method, "make_request called outside a Tokio runtime");
            handler(Err(ApiError::NoRuntime));
            return Err(ApiError::NoRuntime);
        };

        let session = self.clone();
        Ok(runtime.spawn(async move {
            let outcome = match request {
                Ok(request) => session.execute(request).await,
                Err(e) => {
                    tracing::warn!(error = %e, "request body could not be encoded");
                    Err(e)
                }
            };
            handler(outcome);
        }))
    }

    /// The first cookie called `name` received by this session, if any.
    pub fn cookie_for_name(&self, name: &str) -> Option<Cookie> {
        self.cookies.cookie_for_name(name)
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.cookies
    }

    /// Build a `ServiceError` in this session's error domain.
    pub fn error_with_status(&self, status: i64, description: &str) -> ServiceError {
        ServiceError {
            domain: self.config.domain.clone(),
            code: status,
            description: description.to_string(),
        }
    }
}

/// `.` and `..`, including their percent-encoded spellings, which URL
/// normalization would also resolve.
fn is_dot_segment(segment: &str) -> bool {
    let segment = segment.to_ascii_lowercase().replace("%2e", ".");
    segment == "." || segment == ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_PARAMS: &[(&str, &str)] = &[];

    fn session() -> ApiSession {
        ApiSession::new(EndpointConfig::parse_api()).unwrap()
    }

    fn session_for(config: EndpointConfig) -> ApiSession {
        ApiSession::new(config).unwrap()
    }

    #[test]
    fn base_path_only() {
        let url = session().build_locator(None, None, NO_PARAMS).unwrap();
        assert_eq!(url.as_str(), "https://parse.udacity.com/parse/classes");
    }

    #[test]
    fn method_and_extension_are_appended() {
        let url = session()
            .build_locator(Some("/StudentLocation"), Some("/8ZExGR5uX8"), NO_PARAMS)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://parse.udacity.com/parse/classes/StudentLocation/8ZExGR5uX8"
        );
    }

    #[test]
    fn no_parameters_means_no_query_delimiter() {
        let url = session().build_locator(Some("/StudentLocation"), None, NO_PARAMS).unwrap();
        assert!(url.query().is_none());
        assert!(!url.as_str().ends_with('?'));
    }

    #[test]
    fn parameters_keep_insertion_order_and_duplicates() {
        let url = session()
            .build_locator(
                Some("/StudentLocation"),
                None,
                &[("order", "-updatedAt"), ("limit", "100"), ("order", "lastName")],
            )
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("order".to_string(), "-updatedAt".to_string()),
                ("limit".to_string(), "100".to_string()),
                ("order".to_string(), "lastName".to_string()),
            ]
        );
    }

    #[test]
    fn parameter_values_are_stringified() {
        let url = session()
            .build_locator(Some("/StudentLocation"), None, &[("limit", 100), ("skip", 0)])
            .unwrap();
        assert_eq!(url.query(), Some("limit=100&skip=0"));
    }

    #[test]
    fn parameter_values_are_percent_encoded() {
        let url = session()
            .build_locator(
                Some("/StudentLocation"),
                None,
                &[("where", r#"{"uniqueKey":"u 1"}"#)],
            )
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0].1, r#"{"uniqueKey":"u 1"}"#);
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn host_with_port_is_kept() {
        let url = session_for(EndpointConfig::new("http", "127.0.0.1:3000", "/api", "Test"))
            .build_locator(Some("/session"), None, NO_PARAMS)
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/api/session");
    }

    #[test]
    fn illegal_host_is_invalid_address() {
        let err = session_for(EndpointConfig::new("https", "bad host", "/api", "Test"))
            .build_locator(None, None, NO_PARAMS)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidAddress(_)));
    }

    #[test]
    fn empty_host_is_invalid_address() {
        let err = session_for(EndpointConfig::new("https", "", "/api", "Test"))
            .build_locator(None, None, NO_PARAMS)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidAddress(_)));
    }

    #[test]
    fn host_carrying_a_path_is_invalid_address() {
        let err = session_for(EndpointConfig::new("https", "example.com/extra", "/api", "Test"))
            .build_locator(None, None, NO_PARAMS)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidAddress(_)));
    }

    #[test]
    fn relative_path_is_invalid_address() {
        let err = session_for(EndpointConfig::new("https", "example.com", "", "Test"))
            .build_locator(Some("session"), None, NO_PARAMS)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidAddress(_)));
    }

    #[test]
    fn dot_segments_in_extension_are_invalid_address() {
        for extension in ["/../../../secret", "/./x", "/%2e%2E/session", "/.%2e", "/..\\session"] {
            let err = session()
                .build_locator(Some("/StudentLocation"), Some(extension), NO_PARAMS)
                .unwrap_err();
            assert!(matches!(err, ApiError::InvalidAddress(_)), "{extension}");
        }
    }

    #[test]
    fn dots_inside_a_segment_are_kept() {
        let url = session()
            .build_locator(Some("/StudentLocation"), Some("/a..b/.hidden"), NO_PARAMS)
            .unwrap();
        assert_eq!(url.path(), "/parse/classes/StudentLocation/a..b/.hidden");
    }

    #[test]
    fn error_with_status_uses_config_domain() {
        let err = session().error_with_status(401, "Unauthorized");
        assert_eq!(err.domain, "ParseClient");
        assert_eq!(err.code, 401);
        assert_eq!(err.description, "Unauthorized");
    }

    #[test]
    fn default_policy_is_legacy() {
        assert_eq!(session().status_policy(), StatusPolicy::Legacy);
        let strict = session().with_status_policy(StatusPolicy::Strict);
        assert_eq!(strict.status_policy(), StatusPolicy::Strict);
    }

    #[test]
    fn default_timeout_is_bounded() {
        assert_eq!(session().timeout(), DEFAULT_TIMEOUT);
        let short = session().with_timeout(Duration::from_millis(250));
        assert_eq!(short.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn make_request_outside_runtime_reports_instead_of_panicking() {
        use std::sync::Mutex;

        let session = session();
        let locator = session.build_locator(Some("/StudentLocation"), None, NO_PARAMS).unwrap();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);

        let result = session.make_request::<(), _>(locator, HttpMethod::Get, None, None, move |outcome| {
            sink.lock().unwrap().push(outcome);
        });

        assert!(matches!(result, Err(ApiError::NoRuntime)));
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], Err(ApiError::NoRuntime)));
    }

    #[test]
    fn fresh_session_has_no_cookies() {
        assert!(session().cookie_for_name("XSRF-TOKEN").is_none());
    }
}
