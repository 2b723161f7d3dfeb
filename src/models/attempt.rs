// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use std::collections::HashMap;

/// Represents the 'exam_attempts' table.
///
/// `attempt_number` is monotonic per (user, exam). A partial unique index
/// guarantees at most one row with `completed_at IS NULL` per (user, exam).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: i64,
    pub user_id: i64,
    pub exam_id: i64,
    pub attempt_number: i32,

    /// Answers map keyed by question id. Overwritten wholesale on save
    /// (last-write-wins).
    pub answers: Json<HashMap<i64, String>>,

    /// Set at submit time, together with `passed` and `completed_at`.
    pub score: Option<i64>,
    pub passed: Option<bool>,

    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for saving attempt progress.
#[derive(Debug, Deserialize)]
pub struct SaveProgressRequest {
    pub answers: HashMap<i64, String>,
}

/// DTO for submitting an attempt. The answers map is optional; when present
/// it replaces saved progress before scoring.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: Option<HashMap<i64, String>>,
}

/// Score summary returned from submit.
#[derive(Debug, Serialize)]
pub struct AttemptResult {
    pub attempt_id: i64,
    pub score: i64,
    pub total_marks: i64,
    pub percentage: i64,
    pub passed: bool,
}

/// Per-question breakdown for post-completion review.
#[derive(Debug, Serialize)]
pub struct ReviewItem {
    pub question_id: i64,
    pub content: String,
    pub your_answer: Option<String>,
    pub correct_answer: String,
    pub correct: bool,
    pub marks_awarded: i64,
    pub marks: i64,
    pub explanation: Option<String>,
}
