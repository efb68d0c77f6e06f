//! Student-location operations against the Parse backend.

use serde::de::DeserializeOwned;

use crate::client::ApiSession;
use crate::config::ParseCredentials;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::types::{ParseCreated, ParseResults, ParseUpdated, StudentLocation};

const STUDENT_LOCATION: &str = "/StudentLocation";
const APPLICATION_ID_HEADER: &str = "X-Parse-Application-Id";
const REST_API_KEY_HEADER: &str = "X-Parse-REST-API-Key";

/// Parse client for the `StudentLocation` class.
#[derive(Debug, Clone)]
pub struct ParseClient {
    session: ApiSession,
    credentials: ParseCredentials,
}

impl ParseClient {
    pub fn new(session: ApiSession, credentials: ParseCredentials) -> Self {
        Self {
            session,
            credentials,
        }
    }

    pub fn session(&self) -> &ApiSession {
        &self.session
    }

    /// The most recent `limit` locations, sorted by `order` (e.g. `-updatedAt`).
    pub async fn student_locations(
        &self,
        limit: u32,
        order: &str,
    ) -> Result<Vec<StudentLocation>, ApiError> {
        let limit = limit.to_string();
        let locator = self.session.build_locator(
            Some(STUDENT_LOCATION),
            None,
            &[("limit", limit.as_str()), ("order", order)],
        )?;
        let results: ParseResults<StudentLocation> =
            self.fetch(self.request(HttpMethod::Get, locator)).await?;
        Ok(results.results)
    }

    /// The location previously posted by the student with `unique_key`, if any.
    pub async fn student_location_for(
        &self,
        unique_key: &str,
    ) -> Result<Option<StudentLocation>, ApiError> {
        let filter = serde_json::json!({ "uniqueKey": unique_key }).to_string();
        let locator =
            self.session
                .build_locator(Some(STUDENT_LOCATION), None, &[("where", filter)])?;
        let results: ParseResults<StudentLocation> =
            self.fetch(self.request(HttpMethod::Get, locator)).await?;
        Ok(results.results.into_iter().next())
    }

    /// Create a new location record and return its object id.
    pub async fn post_student_location(
        &self,
        media_url: &str,
        location: &StudentLocation,
    ) -> Result<String, ApiError> {
        let locator = self
            .session
            .build_locator::<&str, &str>(Some(STUDENT_LOCATION), None, &[])?;
        let body = with_media_url(location, media_url);
        let created: ParseCreated = self
            .fetch(self.request(HttpMethod::Post, locator).json(&body)?)
            .await?;
        tracing::info!(object_id = %created.object_id, "posted student location");
        Ok(created.object_id)
    }

    /// Replace the record `object_id` with `location`, using `media_url`.
    pub async fn update_student_location(
        &self,
        object_id: &str,
        media_url: &str,
        location: &StudentLocation,
    ) -> Result<(), ApiError> {
        let extension = format!("/{object_id}");
        let locator = self.session.build_locator::<&str, &str>(
            Some(STUDENT_LOCATION),
            Some(&extension),
            &[],
        )?;
        let mut body = with_media_url(location, media_url);
        body.object_id.clear();
        let _: ParseUpdated = self
            .fetch(self.request(HttpMethod::Put, locator).json(&body)?)
            .await?;
        tracing::info!(%object_id, "updated student location");
        Ok(())
    }

    fn request(&self, method: HttpMethod, locator: url::Url) -> HttpRequest {
        HttpRequest::new(method, locator)
            .header(APPLICATION_ID_HEADER, self.credentials.application_id.as_str())
            .header(REST_API_KEY_HEADER, self.credentials.rest_api_key.as_str())
    }

    async fn fetch<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ApiError> {
        let (status, payload) = self.session.execute_with_status(request).await?;
        if let Some((code, description)) = service_error(status, &payload) {
            return Err(self.session.error_with_status(code, &description).into());
        }
        serde_json::from_slice(&payload).map_err(ApiError::Decoding)
    }
}

/// Error body returned by Parse (`{"code": 101, "error": "..."}`). Some
/// failures, such as rejected keys, carry no `code`.
#[derive(Debug, serde::Deserialize)]
struct ParseErrorBody {
    code: Option<i64>,
    error: String,
}

/// The code and description of a Parse error body, falling back to the HTTP
/// status when the body has no code of its own.
fn service_error(status: u16, payload: &[u8]) -> Option<(i64, String)> {
    let body: ParseErrorBody = serde_json::from_slice(payload).ok()?;
    Some((body.code.unwrap_or(i64::from(status)), body.error))
}

fn with_media_url(location: &StudentLocation, media_url: &str) -> StudentLocation {
    let mut location = location.clone();
    location.student.media_url = media_url.to_string();
    location
}
