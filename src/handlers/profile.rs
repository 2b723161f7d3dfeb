// src/handlers/profile.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{attempt::ExamAttempt, enrollment::EnrollmentListItem, user::MeResponse},
    utils::jwt::Claims,
};

/// Gets the current user's profile and statistics.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let me: Option<MeRow> = sqlx::query_as(
        r#"
        SELECT
            u.id, u.username, u.role, u.is_premium, u.premium_expires_at, u.created_at,
            (SELECT COUNT(*) FROM program_enrollments
             WHERE user_id = u.id AND status IN ('active', 'in_progress')
               AND (expires_at IS NULL OR expires_at > NOW())) AS active_enrollments,
            (SELECT COUNT(*) FROM exam_attempts
             WHERE user_id = u.id AND completed_at IS NOT NULL) AS completed_attempts
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?;

    let me = me.ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(MeResponse {
        id: me.id,
        username: me.username,
        role: me.role,
        is_premium: me.is_premium,
        premium_expires_at: me.premium_expires_at,
        created_at: me.created_at,
        active_enrollments: me.active_enrollments,
        completed_attempts: me.completed_attempts,
    }))
}

#[derive(sqlx::FromRow)]
struct MeRow {
    id: i64,
    username: String,
    role: String,
    is_premium: bool,
    premium_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    active_enrollments: i64,
    completed_attempts: i64,
}

/// Lists the current user's program enrollments, newest first.
pub async fn list_my_enrollments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let enrollments = sqlx::query_as::<_, EnrollmentListItem>(
        r#"
        SELECT e.id, e.user_id, u.username, e.program_id, p.code AS program_code,
               p.name AS program_name, e.status, e.expires_at, e.created_at
        FROM program_enrollments e
        JOIN programs p ON e.program_id = p.id
        JOIN users u ON e.user_id = u.id
        WHERE e.user_id = $1
        ORDER BY e.created_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(enrollments))
}

/// Lists the current user's exam attempts, newest first.
pub async fn list_my_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_as::<_, ExamAttempt>(
        r#"
        SELECT id, user_id, exam_id, attempt_number, answers, score, passed,
               started_at, completed_at
        FROM exam_attempts
        WHERE user_id = $1
        ORDER BY started_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}
