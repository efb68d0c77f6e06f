use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const APPLICATION_ID: &str = "test-application-id";
pub const REST_API_KEY: &str = "test-rest-api-key";
pub const USERNAME: &str = "ada@example.com";
pub const PASSWORD: &str = "analytical-engine";
pub const ACCOUNT_KEY: &str = "3903878747";
pub const SESSION_ID: &str = "1457628510Sc18f2ad4cd3fb317fb8e028488694088";
pub const XSRF_TOKEN: &str = "xsrf-3903878747";

/// Prepended to every Udacity response body.
pub const UDACITY_PREFIX: &str = ")]}'\n";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StudentLocation {
    #[serde(rename = "objectId")]
    pub object_id: String,
    #[serde(rename = "uniqueKey")]
    pub unique_key: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "mediaURL")]
    pub media_url: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "mapString")]
    pub map_string: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct StudentLocationInput {
    #[serde(rename = "uniqueKey")]
    pub unique_key: String,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(rename = "mediaURL", default)]
    pub media_url: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "mapString", default)]
    pub map_string: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub order: Option<String>,
    #[serde(rename = "where")]
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub udacity: Credentials,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub type Db = Arc<RwLock<Vec<StudentLocation>>>;

pub fn app() -> Router {
    app_with(Db::default())
}

/// Build the router around an existing store, so tests can seed or inspect it.
pub fn app_with(db: Db) -> Router {
    Router::new()
        .route(
            "/parse/classes/StudentLocation",
            get(list_locations).post(create_location),
        )
        .route("/parse/classes/StudentLocation/{id}", put(update_location))
        .route("/api/session", post(create_session).delete(delete_session))
        .route("/api/users/{key}", get(get_user))
        .route("/status/{code}", get(status))
        .route("/echo", any(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    secs.to_string()
}

fn parse_authorized(headers: &HeaderMap) -> bool {
    let matches = |name: &str, expected: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    };
    matches("x-parse-application-id", APPLICATION_ID) && matches("x-parse-rest-api-key", REST_API_KEY)
}

fn parse_forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": "unauthorized" }))).into_response()
}

async fn list_locations(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    if !parse_authorized(&headers) {
        return parse_forbidden();
    }

    let unique_key = params
        .filter
        .as_deref()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .and_then(|filter| filter["uniqueKey"].as_str().map(str::to_string));

    let locations = db.read().await;
    let mut results: Vec<StudentLocation> = locations
        .iter()
        .filter(|l| unique_key.as_deref().map_or(true, |key| l.unique_key == key))
        .cloned()
        .collect();
    if params.order.as_deref().is_some_and(|o| o.starts_with('-')) {
        results.reverse();
    }
    results.truncate(params.limit.unwrap_or(100));

    Json(json!({ "results": results })).into_response()
}

async fn create_location(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<StudentLocationInput>,
) -> Response {
    if !parse_authorized(&headers) {
        return parse_forbidden();
    }

    let now = timestamp();
    let location = StudentLocation {
        object_id: Uuid::new_v4().simple().to_string(),
        unique_key: input.unique_key,
        first_name: input.first_name,
        last_name: input.last_name,
        media_url: input.media_url,
        latitude: input.latitude,
        longitude: input.longitude,
        map_string: input.map_string,
        created_at: now.clone(),
        updated_at: now,
    };
    tracing::debug!(object_id = %location.object_id, "created student location");
    let body = json!({ "objectId": location.object_id, "createdAt": location.created_at });
    db.write().await.push(location);
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn update_location(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<StudentLocationInput>,
) -> Response {
    if !parse_authorized(&headers) {
        return parse_forbidden();
    }

    let mut locations = db.write().await;
    let Some(location) = locations.iter_mut().find(|l| l.object_id == id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": 101, "error": "object not found for update" })),
        )
            .into_response();
    };
    location.unique_key = input.unique_key;
    location.first_name = input.first_name;
    location.last_name = input.last_name;
    location.media_url = input.media_url;
    location.latitude = input.latitude;
    location.longitude = input.longitude;
    location.map_string = input.map_string;
    location.updated_at = timestamp();
    Json(json!({ "updatedAt": location.updated_at })).into_response()
}

fn udacity_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        format!("{UDACITY_PREFIX}{body}"),
    )
        .into_response()
}

fn udacity_error(status: StatusCode, message: &str) -> Response {
    udacity_response(status, json!({ "status": status.as_u16(), "error": message }))
}

async fn create_session(Json(login): Json<LoginBody>) -> Response {
    if login.udacity.username != USERNAME || login.udacity.password != PASSWORD {
        return udacity_error(StatusCode::FORBIDDEN, "Account not found or invalid credentials.");
    }

    let mut response = udacity_response(
        StatusCode::OK,
        json!({
            "account": { "registered": true, "key": ACCOUNT_KEY },
            "session": { "id": SESSION_ID, "expiration": "2030-01-01T00:00:00.000000Z" }
        }),
    );
    if let Ok(cookie) = format!("XSRF-TOKEN={XSRF_TOKEN}; Path=/").parse() {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

async fn delete_session(headers: HeaderMap) -> Response {
    let token = headers.get("x-xsrf-token").and_then(|v| v.to_str().ok());
    if token != Some(XSRF_TOKEN) {
        return udacity_error(StatusCode::FORBIDDEN, "Missing or invalid XSRF token.");
    }

    let mut response = udacity_response(
        StatusCode::OK,
        json!({ "session": { "id": SESSION_ID, "expiration": "2030-01-01T00:00:00.000000Z" } }),
    );
    if let Ok(cookie) = "XSRF-TOKEN=; Path=/; Max-Age=0".parse() {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

async fn get_user(Path(key): Path<String>) -> Response {
    if key != ACCOUNT_KEY {
        return udacity_error(StatusCode::NOT_FOUND, "User not found.");
    }
    udacity_response(
        StatusCode::OK,
        json!({ "user": { "key": ACCOUNT_KEY, "first_name": "Ada", "last_name": "Lovelace" } }),
    )
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    /// Raw body to answer with instead of the default JSON.
    pub body: Option<String>,
}

async fn status(Path(code): Path<u16>, Query(params): Query<StatusParams>) -> Response {
    let Ok(status) = StatusCode::from_u16(code) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match params.body {
        Some(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => (status, Json(json!({ "status": code }))).into_response(),
    }
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<serde_json::Value> {
    let headers: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), json!(v))))
        .collect();
    Json(json!({ "method": method.as_str(), "headers": headers, "body": body }))
}
