// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'exams' table in the database.
///
/// Lifecycle: 'draft' -> 'published' (snapshots into exam_versions) ->
/// optionally soft-deleted via `is_active = false`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exam {
    pub id: i64,

    pub institution_id: Option<i64>,

    /// Program whose enrollment gates access. NULL for unattached exams.
    pub program_id: Option<i64>,

    /// Global exams are open to any active program enrollment.
    pub is_global: bool,

    pub title: String,

    pub description: String,

    /// 'draft' or 'published'.
    pub status: String,

    /// Scheduling window. NULL bounds are open-ended.
    pub start_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_at: Option<chrono::DateTime<chrono::Utc>>,

    pub duration_minutes: i32,

    /// Minimum score required to pass.
    pub passing_marks: i64,

    /// NULL means unlimited attempts; 0 means no attempts allowed.
    pub max_attempts: Option<i32>,

    /// Slug for publicly shareable exams.
    pub share_slug: Option<String>,

    pub is_active: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Immutable snapshot of an exam captured at publish time.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamVersion {
    pub id: i64,
    pub exam_id: i64,
    pub version: i32,
    pub content: sqlx::types::Json<serde_json::Value>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new exam (created as draft).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    pub institution_id: Option<i64>,
    pub program_id: Option<i64>,
    #[serde(default)]
    pub is_global: bool,
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    pub start_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_at: Option<chrono::DateTime<chrono::Utc>>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i32>,
    #[validate(range(min = 0))]
    pub passing_marks: Option<i64>,
    #[validate(range(min = 0))]
    pub max_attempts: Option<i32>,
    #[validate(length(min = 1, max = 100))]
    pub share_slug: Option<String>,
}

/// DTO for updating an exam. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateExamRequest {
    pub institution_id: Option<i64>,
    pub program_id: Option<i64>,
    pub is_global: Option<bool>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_minutes: Option<i32>,
    pub passing_marks: Option<i64>,
    pub max_attempts: Option<i32>,
    pub share_slug: Option<String>,
}
