// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub exam_id: i64,

    /// The text content of the question.
    pub content: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// The correct answer key or content. Exact-match scored.
    pub correct_answer: String,

    /// Marks awarded for a correct answer.
    pub marks: i64,

    /// Explanation shown during post-submit review.
    pub explanation: Option<String>,

    /// Explicit ordering within the exam.
    pub position: i32,

    /// Soft-delete flag.
    pub is_active: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to an exam taker.
/// Excludes the correct answer and explanation.
#[derive(Debug, Serialize, FromRow)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub options: Json<Vec<String>>,
    pub marks: i64,
    pub position: i32,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub exam_id: i64,
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: String,
    #[validate(range(min = 0))]
    pub marks: Option<i64>,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
    pub position: Option<i32>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub content: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub marks: Option<i64>,
    pub explanation: Option<String>,
    pub position: Option<i32>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
