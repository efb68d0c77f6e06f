//! Session handling and public user data from the Udacity API.

use serde::de::DeserializeOwned;

use crate::client::ApiSession;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::types::{
    Student, UdacityCredentials, UdacityErrorBody, UdacityLogin, UdacitySession,
    UdacityUserEnvelope,
};

const SESSION: &str = "/session";
const USERS: &str = "/users";
const XSRF_COOKIE: &str = "XSRF-TOKEN";
const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// Every Udacity JSON response starts with this anti-XSSI guard.
const RESPONSE_PREFIX_LEN: usize = 5;

/// An authenticated Udacity session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub account_key: String,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct UdacityClient {
    session: ApiSession,
}

impl UdacityClient {
    pub fn new(session: ApiSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ApiSession {
        &self.session
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Login, ApiError> {
        let locator = self.session.build_locator::<&str, &str>(Some(SESSION), None, &[])?;
        let body = UdacityLogin {
            udacity: UdacityCredentials {
                username: username.to_string(),
                password: password.to_string(),
            },
        };
        let request = HttpRequest::new(HttpMethod::Post, locator)
            .header("Accept", "application/json")
            .json(&body)?;
        let session: UdacitySession = self.fetch(request).await?;
        tracing::info!(account = %session.account.key, "logged in");
        Ok(Login {
            account_key: session.account.key,
            session_id: session.session.id,
        })
    }

    /// End the current session, echoing the `XSRF-TOKEN` cookie if one was
    /// received.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let locator = self.session.build_locator::<&str, &str>(Some(SESSION), None, &[])?;
        let mut request = HttpRequest::new(HttpMethod::Delete, locator);
        if let Some(cookie) = self.session.cookie_for_name(XSRF_COOKIE) {
            request = request.header(XSRF_HEADER, cookie.value);
        }
        let _: serde_json::Value = self.fetch(request).await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Public profile of `user_key` as a `Student`.
    pub async fn student(&self, user_key: &str) -> Result<Student, ApiError> {
        let extension = format!("/{user_key}");
        let locator = self
            .session
            .build_locator::<&str, &str>(Some(USERS), Some(&extension), &[])?;
        let envelope: UdacityUserEnvelope =
            self.fetch(HttpRequest::new(HttpMethod::Get, locator)).await?;
        let user = envelope.user;
        Ok(Student::with_details(&user.key, &user.first_name, &user.last_name, ""))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ApiError> {
        let payload = self.session.execute(request).await?;
        let body = strip_prefix(&payload);
        if let Ok(error) = serde_json::from_slice::<UdacityErrorBody>(body) {
            return Err(self.session.error_with_status(error.status, &error.error).into());
        }
        serde_json::from_slice(body).map_err(ApiError::Decoding)
    }
}

fn strip_prefix(payload: &[u8]) -> &[u8] {
    payload.get(RESPONSE_PREFIX_LEN..).unwrap_or_default()
}
