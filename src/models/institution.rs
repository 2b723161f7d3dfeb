// src/models/institution.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use url::Url;
use validator::Validate;

/// Represents the 'institutions' table in the database.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Institution {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Optional URL to the institution logo.
    pub logo_url: Option<String>,
    /// Soft-delete flag; inactive rows disappear from public listings.
    pub is_active: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new institution.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInstitutionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[validate(custom(function = validate_optional_url))]
    pub logo_url: Option<String>,
}

/// DTO for updating an institution. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateInstitutionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub is_active: Option<bool>,
}

/// Validates that an optional string, when present, is a well-formed URL.
pub fn validate_optional_url(url: &str) -> Result<(), validator::ValidationError> {
    if url.len() > 500 {
        return Err(validator::ValidationError::new("url_too_long"));
    }
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
