// src/handlers/catalog.rs
//
// Public browse surface: institutions, programs, exams and shareable exams.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{exam::Exam, institution::Institution, program::Program, question::PublicQuestion},
};

/// Lists active institutions.
pub async fn list_institutions(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let institutions = sqlx::query_as::<_, Institution>(
        r#"
        SELECT id, name, description, logo_url, is_active, created_at
        FROM institutions
        WHERE is_active = TRUE
        ORDER BY name
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list institutions: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    Ok(Json(institutions))
}

/// Gets a single active institution by id.
pub async fn get_institution(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let institution = sqlx::query_as::<_, Institution>(
        r#"
        SELECT id, name, description, logo_url, is_active, created_at
        FROM institutions
        WHERE id = $1 AND is_active = TRUE
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Institution not found".to_string()))?;

    Ok(Json(institution))
}

/// Lists active programs.
pub async fn list_programs(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let programs = sqlx::query_as::<_, Program>(
        r#"
        SELECT id, code, name, price, duration_months, is_active, created_at
        FROM programs
        WHERE is_active = TRUE
        ORDER BY code
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(programs))
}

/// Gets a single active program by id.
pub async fn get_program(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let program = sqlx::query_as::<_, Program>(
        r#"
        SELECT id, code, name, price, duration_months, is_active, created_at
        FROM programs
        WHERE id = $1 AND is_active = TRUE
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Program not found".to_string()))?;

    Ok(Json(program))
}

#[derive(Debug, Deserialize)]
pub struct ExamListParams {
    pub institution_id: Option<i64>,
    pub program_id: Option<i64>,
}

/// Lists published, active exams. Soft-deleted exams never appear here.
pub async fn list_exams(
    State(pool): State<PgPool>,
    Query(params): Query<ExamListParams>,
) -> Result<impl IntoResponse, AppError> {
    let exams = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, institution_id, program_id, is_global, title, description, status,
               start_at, end_at, duration_minutes, passing_marks, max_attempts,
               share_slug, is_active, created_at
        FROM exams
        WHERE status = 'published' AND is_active = TRUE
          AND ($1::BIGINT IS NULL OR institution_id = $1)
          AND ($2::BIGINT IS NULL OR program_id = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(params.institution_id)
    .bind(params.program_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list exams: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    Ok(Json(exams))
}

/// Gets a single exam by id.
///
/// Soft-deleted exams stay fetchable by id (with their version history);
/// only listings hide them. Drafts remain invisible to non-admin callers.
pub async fn get_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, institution_id, program_id, is_global, title, description, status,
               start_at, end_at, duration_minutes, passing_marks, max_attempts,
               share_slug, is_active, created_at
        FROM exams
        WHERE id = $1 AND status = 'published'
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    Ok(Json(exam))
}

/// Fetches a publicly shareable exam by slug, with its sanitized questions.
/// Share-slug exams bypass the enrollment gate for viewing.
pub async fn get_shared_exam(
    State(pool): State<PgPool>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, institution_id, program_id, is_global, title, description, status,
               start_at, end_at, duration_minutes, passing_marks, max_attempts,
               share_slug, is_active, created_at
        FROM exams
        WHERE share_slug = $1 AND status = 'published' AND is_active = TRUE
        "#,
    )
    .bind(&slug)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Shared exam not found".to_string()))?;

    let questions = sqlx::query_as::<_, PublicQuestion>(
        r#"
        SELECT id, content, options, marks, position
        FROM questions
        WHERE exam_id = $1 AND is_active = TRUE
        ORDER BY position, id
        "#,
    )
    .bind(exam.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "exam": exam,
        "questions": questions,
    })))
}
