// src/handlers/admin_exams.rs
//
// Admin console: exam and question management, including the publish
// snapshot into exam_versions.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        exam::{CreateExamRequest, Exam, ExamVersion, UpdateExamRequest},
        question::{CreateQuestionRequest, Question, UpdateQuestionRequest},
    },
};

const EXAM_COLUMNS: &str = "id, institution_id, program_id, is_global, title, description, status, \
     start_at, end_at, duration_minutes, passing_marks, max_attempts, \
     share_slug, is_active, created_at";

/// Lists all exams, drafts and soft-deleted rows included.
pub async fn list_exams(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let exams = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {} FROM exams ORDER BY created_at DESC",
        EXAM_COLUMNS
    ))
    .fetch_all(&pool)
    .await?;

    Ok(Json(exams))
}

/// Creates a new exam as a draft.
pub async fn create_exam(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if let (Some(start), Some(end)) = (payload.start_at, payload.end_at) {
        if end <= start {
            return Err(AppError::Validation(
                "end_at must be after start_at".to_string(),
            ));
        }
    }

    let exam = sqlx::query_as::<_, Exam>(&format!(
        r#"
        INSERT INTO exams
        (institution_id, program_id, is_global, title, description,
         start_at, end_at, duration_minutes, passing_marks, max_attempts, share_slug)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {}
        "#,
        EXAM_COLUMNS
    ))
    .bind(payload.institution_id)
    .bind(payload.program_id)
    .bind(payload.is_global)
    .bind(&payload.title)
    .bind(payload.description.as_deref().unwrap_or(""))
    .bind(payload.start_at)
    .bind(payload.end_at)
    .bind(payload.duration_minutes.unwrap_or(60))
    .bind(payload.passing_marks.unwrap_or(0))
    .bind(payload.max_attempts)
    .bind(&payload.share_slug)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Share slug already in use".to_string())
        } else {
            tracing::error!("Failed to create exam: {:?}", e);
            AppError::Internal(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Updates an exam by id.
pub async fn update_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE exams SET ");
    let mut separated = builder.separated(", ");
    let mut any = false;

    if let Some(institution_id) = payload.institution_id {
        separated.push("institution_id = ");
        separated.push_bind_unseparated(institution_id);
        any = true;
    }
    if let Some(program_id) = payload.program_id {
        separated.push("program_id = ");
        separated.push_bind_unseparated(program_id);
        any = true;
    }
    if let Some(is_global) = payload.is_global {
        separated.push("is_global = ");
        separated.push_bind_unseparated(is_global);
        any = true;
    }
    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
        any = true;
    }
    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
        any = true;
    }
    if let Some(start_at) = payload.start_at {
        separated.push("start_at = ");
        separated.push_bind_unseparated(start_at);
        any = true;
    }
    if let Some(end_at) = payload.end_at {
        separated.push("end_at = ");
        separated.push_bind_unseparated(end_at);
        any = true;
    }
    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
        any = true;
    }
    if let Some(passing_marks) = payload.passing_marks {
        separated.push("passing_marks = ");
        separated.push_bind_unseparated(passing_marks);
        any = true;
    }
    if let Some(max_attempts) = payload.max_attempts {
        separated.push("max_attempts = ");
        separated.push_bind_unseparated(max_attempts);
        any = true;
    }
    if let Some(share_slug) = payload.share_slug {
        separated.push("share_slug = ");
        separated.push_bind_unseparated(share_slug);
        any = true;
    }

    if !any {
        return Ok(StatusCode::OK);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Share slug already in use".to_string())
        } else {
            tracing::error!("Failed to update exam: {:?}", e);
            AppError::Internal(e.to_string())
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Publishes an exam: flips status to 'published' and snapshots the exam
/// metadata plus its active questions into exam_versions, in one transaction.
pub async fn publish_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let exam = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {} FROM exams WHERE id = $1 AND is_active = TRUE FOR UPDATE",
        EXAM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, exam_id, content, options, correct_answer, marks, explanation,
               position, is_active, created_at
        FROM questions
        WHERE exam_id = $1 AND is_active = TRUE
        ORDER BY position, id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    if questions.is_empty() {
        return Err(AppError::Validation(
            "Cannot publish an exam with no questions".to_string(),
        ));
    }

    sqlx::query("UPDATE exams SET status = 'published' WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let next_version: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM exam_versions WHERE exam_id = $1",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    let snapshot = serde_json::json!({
        "exam": exam,
        "questions": questions,
    });

    let version = sqlx::query_as::<_, ExamVersion>(
        r#"
        INSERT INTO exam_versions (exam_id, version, content)
        VALUES ($1, $2, $3)
        RETURNING id, exam_id, version, content, created_at
        "#,
    )
    .bind(id)
    .bind(next_version)
    .bind(sqlx::types::Json(snapshot))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!("Exam {} published as version {}", id, version.version);

    Ok(Json(serde_json::json!({
        "id": id,
        "status": "published",
        "version": version.version,
    })))
}

/// Lists the immutable version history of an exam.
/// Available even after the exam is soft-deleted.
pub async fn list_exam_versions(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let versions = sqlx::query_as::<_, ExamVersion>(
        r#"
        SELECT id, exam_id, version, content, created_at
        FROM exam_versions
        WHERE exam_id = $1
        ORDER BY version DESC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(versions))
}

/// Soft-deletes an exam. The row and its version history remain queryable
/// by id; listings stop showing it.
pub async fn delete_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE exams SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// Lists all questions of an exam, correct answers included.
pub async fn list_questions(
    State(pool): State<PgPool>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, exam_id, content, options, correct_answer, marks, explanation,
               position, is_active, created_at
        FROM questions
        WHERE exam_id = $1
        ORDER BY position, id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(questions))
}

/// Creates a new question. Position defaults to the end of the exam.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let exam_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM exams WHERE id = $1")
        .bind(payload.exam_id)
        .fetch_optional(&pool)
        .await?;
    if exam_exists.is_none() {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    let position = match payload.position {
        Some(p) => p,
        None => {
            sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(position), 0) + 1 FROM questions WHERE exam_id = $1",
            )
            .bind(payload.exam_id)
            .fetch_one(&pool)
            .await?
        }
    };

    let options_json = serde_json::to_value(&payload.options).unwrap_or_default();

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions
        (exam_id, content, options, correct_answer, marks, explanation, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, exam_id, content, options, correct_answer, marks, explanation,
                  position, is_active, created_at
        "#,
    )
    .bind(payload.exam_id)
    .bind(&payload.content)
    .bind(options_json)
    .bind(&payload.correct_answer)
    .bind(payload.marks.unwrap_or(1))
    .bind(&payload.explanation)
    .bind(position)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates a question by id.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.content.is_none()
        && payload.options.is_none()
        && payload.correct_answer.is_none()
        && payload.marks.is_none()
        && payload.explanation.is_none()
        && payload.position.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(content);
    }
    if let Some(options) = payload.options {
        separated.push("options = ");
        separated.push_bind_unseparated(serde_json::to_value(options).unwrap_or_default());
    }
    if let Some(correct_answer) = payload.correct_answer {
        separated.push("correct_answer = ");
        separated.push_bind_unseparated(correct_answer);
    }
    if let Some(marks) = payload.marks {
        separated.push("marks = ");
        separated.push_bind_unseparated(marks);
    }
    if let Some(explanation) = payload.explanation {
        separated.push("explanation = ");
        separated.push_bind_unseparated(explanation);
    }
    if let Some(position) = payload.position {
        separated.push("position = ");
        separated.push_bind_unseparated(position);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Soft-deletes a question. Attempts already holding an answer for it
/// simply stop matching at scoring time.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE questions SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
