use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod person;

/// A person whose birthday is tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub birthdate: NaiveDate,
    /// IANA zone identifier, e.g. `Asia/Jakarta`
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated data for a new person record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerson {
    pub name: String,
    pub email: String,
    pub birthdate: NaiveDate,
    pub timezone: String,
}

/// Validated partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub timezone: Option<String>,
}

/// Raw create input as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonCreateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    /// ISO 8601 date (`1990-01-01`) or timestamp
    pub birthdate: Option<String>,
    pub timezone: Option<String>,
}

/// Raw update input as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub birthdate: Option<String>,
    pub timezone: Option<String>,
}
