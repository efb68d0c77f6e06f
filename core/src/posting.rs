//! The "post your study location" flow, without any UI.
//!
//! # Design
//! The flow has two steps. First a free-text place is geocoded and the first
//! placemark kept (`MapString`). Then a media URL is attached and the location
//! is either posted or, when the student already has a record, updated
//! (`MediaUrl`). Geocoding is a platform service, so callers supply it through
//! the `Geocoder` trait. Each failure maps to one user-facing message.

use std::future::Future;

use crate::parse::ParseClient;
use crate::types::{Location, Student, StudentLocation};

/// Which input the flow is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingState {
    MapString,
    MediaUrl,
}

/// A geocoded place.
#[derive(Debug, Clone, PartialEq)]
pub struct Placemark {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("geocoding failed: {0}")]
pub struct GeocodeError(pub String);

/// Resolves a free-text address to candidate placemarks.
pub trait Geocoder {
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<Placemark>, GeocodeError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostingError {
    #[error("Must enter a location.")]
    MapStringEmpty,
    #[error("Could not geocode the string.")]
    CouldNotGeocode,
    #[error("No location found.")]
    NoLocationFound,
    #[error("Must enter a URL.")]
    UrlEmpty,
    #[error("Student and placemark not initialized.")]
    StudentAndPlacemarkEmpty,
    #[error("Failed to post student location.")]
    PostStudentLocationFailed,
}

#[derive(Debug, Clone)]
pub struct PostingFlow {
    state: PostingState,
    student: Option<Student>,
    object_id: Option<String>,
    map_string: String,
    placemark: Option<Placemark>,
}

impl PostingFlow {
    /// Start a flow for `student`. Pass the object id of an existing record to
    /// update it instead of creating a new one.
    pub fn new(student: Option<Student>, object_id: Option<String>) -> Self {
        Self {
            state: PostingState::MapString,
            student,
            object_id,
            map_string: String::new(),
            placemark: None,
        }
    }

    pub fn state(&self) -> PostingState {
        self.state
    }

    pub fn placemark(&self) -> Option<&Placemark> {
        self.placemark.as_ref()
    }

    pub fn student(&self) -> Option<&Student> {
        self.student.as_ref()
    }

    /// Geocode `map_string` and keep the first placemark.
    pub async fn find_on_the_map<G: Geocoder>(
        &mut self,
        map_string: &str,
        geocoder: &G,
    ) -> Result<&Placemark, PostingError> {
        if map_string.is_empty() {
            return Err(PostingError::MapStringEmpty);
        }

        let placemarks = geocoder.geocode(map_string).await.map_err(|e| {
            tracing::warn!(error = %e, "geocoding failed");
            PostingError::CouldNotGeocode
        })?;
        let placemark = placemarks
            .into_iter()
            .next()
            .ok_or(PostingError::NoLocationFound)?;

        self.map_string = map_string.to_string();
        self.state = PostingState::MediaUrl;
        Ok(&*self.placemark.insert(placemark))
    }

    /// Post or update the location with `media_url`.
    ///
    /// On success the flow's student carries the new media URL, which is
    /// also returned.
    pub async fn submit(
        &mut self,
        media_url: &str,
        parse: &ParseClient,
    ) -> Result<String, PostingError> {
        if media_url.is_empty() {
            return Err(PostingError::UrlEmpty);
        }
        let (Some(student), Some(placemark)) = (self.student.as_mut(), self.placemark.as_ref())
        else {
            return Err(PostingError::StudentAndPlacemarkEmpty);
        };

        let record = StudentLocation {
            object_id: self.object_id.clone().unwrap_or_default(),
            student: student.clone(),
            location: Location {
                latitude: placemark.latitude,
                longitude: placemark.longitude,
                map_string: self.map_string.clone(),
            },
        };

        let result = match self.object_id.as_deref() {
            Some(object_id) => parse
                .update_student_location(object_id, media_url, &record)
                .await
                .map(|()| object_id.to_string()),
            None => parse.post_student_location(media_url, &record).await,
        };
        let object_id = result.map_err(|e| {
            tracing::warn!(error = %e, "posting student location failed");
            PostingError::PostStudentLocationFailed
        })?;

        self.object_id = Some(object_id);
        student.media_url = media_url.to_string();
        Ok(student.media_url.clone())
    }
}
