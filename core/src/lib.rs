//! API client core for the On The Map student-location service.
//!
//! # Overview
//! Students share where they are studying by posting a pin to a Parse
//! backend, after authenticating against the Udacity API. This crate holds
//! everything below the UI: locator building, request execution, cookie
//! handling, the backend clients and the posting flow.
//!
//! # Design
//! - `ApiSession` is constructed once per backend from an `EndpointConfig`
//!   and handed to the clients that use it; there are no global singletons.
//! - Every exchange is one round trip with no retry. Outcomes are a
//!   `Result`, delivered either as a future (`execute`) or to an `FnOnce`
//!   handler (`make_request`).
//! - How a response status is judged is set by `StatusPolicy`; the default
//!   accepts every response that arrived.

pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod http;
pub mod parse;
pub mod posting;
pub mod types;
pub mod udacity;

pub use client::{ApiSession, Outcome};
pub use config::{EndpointConfig, ParseCredentials};
pub use cookies::{Cookie, CookieJar};
pub use error::{ApiError, ServiceError};
pub use http::{Headers, HttpMethod, HttpRequest, StatusPolicy};
pub use parse::ParseClient;
pub use posting::{GeocodeError, Geocoder, Placemark, PostingError, PostingFlow, PostingState};
pub use types::{Location, Student, StudentLocation};
pub use udacity::{Login, UdacityClient};
