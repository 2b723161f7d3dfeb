// src/models/enrollment.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Represents the 'program_enrollments' table.
///
/// Status: 'pending_approval' | 'active' | 'in_progress' | 'completed' |
/// 'expired'. A partial unique index keeps at most one live enrollment per
/// (user, program).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProgramEnrollment {
    pub id: i64,
    pub user_id: i64,
    pub program_id: i64,
    pub status: String,
    /// Computed at activation as now + program.duration_months.
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub payment_id: Option<i64>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'exam_enrollments' table: per-exam attempt accounting.
/// Created lazily at first attempt start once the program gate grants access.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamEnrollment {
    pub id: i64,
    pub user_id: i64,
    pub exam_id: i64,
    pub attempts_used: i32,
    /// NULL means unlimited attempts; 0 means none allowed.
    pub max_attempts: Option<i32>,
    pub status: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Joined enrollment row for profile and admin listings.
#[derive(Debug, Serialize, FromRow)]
pub struct EnrollmentListItem {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub program_id: i64,
    pub program_code: String,
    pub program_name: String,
    pub status: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}
