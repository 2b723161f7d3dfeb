// src/models/program.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'programs' table in the database.
/// Programs are never physically deleted; `is_active` soft-deactivates them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Program {
    pub id: i64,

    /// Unique program code (e.g., "JEE-2026").
    pub code: String,

    pub name: String,

    /// Price in minor currency units. 0 means free.
    pub price: i64,

    /// Enrollment validity; expires_at = activation time + this many months.
    pub duration_months: i32,

    pub is_active: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new program. Super admin only.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProgramRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 0))]
    pub price: i64,
    #[validate(range(min = 1, max = 120))]
    pub duration_months: i32,
}

/// DTO for updating a program. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateProgramRequest {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub duration_months: Option<i32>,
    pub is_active: Option<bool>,
}
