//! Domain records and the wire DTOs of the Parse and Udacity APIs.
//!
//! # Design
//! `Student` keeps its identity fields private so they cannot change after
//! construction; only the media URL is mutable. The Parse wire format is a
//! flat object, so `StudentLocation` flattens its student and location parts.

use serde::{Deserialize, Serialize};

/// A student who can post a study location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "uniqueKey")]
    unique_key: String,
    #[serde(rename = "firstName", default)]
    first_name: String,
    #[serde(rename = "lastName", default)]
    last_name: String,
    #[serde(rename = "mediaURL", default)]
    pub media_url: String,
}

impl Student {
    /// A student known only by key, with empty names and media URL.
    pub fn new(unique_key: &str) -> Self {
        Self::with_details(unique_key, "", "", "")
    }

    pub fn with_details(unique_key: &str, first_name: &str, last_name: &str, media_url: &str) -> Self {
        Self {
            unique_key: unique_key.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            media_url: media_url.to_string(),
        }
    }

    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Where a student is studying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "mapString", default)]
    pub map_string: String,
}

/// A student's posted location as stored by Parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentLocation {
    /// Empty until the record has been created.
    #[serde(rename = "objectId", default, skip_serializing_if = "String::is_empty")]
    pub object_id: String,
    #[serde(flatten)]
    pub student: Student,
    #[serde(flatten)]
    pub location: Location,
}

/// Envelope of a Parse query.
#[derive(Debug, Clone, Deserialize)]
pub struct ParseResults<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseCreated {
    #[serde(rename = "objectId")]
    pub object_id: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseUpdated {
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

/// Login credentials sent to the Udacity session endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdacityLogin {
    pub udacity: UdacityCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdacityCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdacitySession {
    pub account: UdacityAccount,
    pub session: UdacitySessionInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdacityAccount {
    #[serde(default)]
    pub registered: bool,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdacitySessionInfo {
    pub id: String,
    #[serde(default)]
    pub expiration: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdacityUserEnvelope {
    pub user: UdacityUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdacityUser {
    pub key: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Error body returned by the Udacity API on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct UdacityErrorBody {
    pub status: i64,
    pub error: String,
}
