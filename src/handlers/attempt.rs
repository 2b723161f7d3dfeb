// src/handlers/attempt.rs
//
// Enrollment gate, attempt lifecycle (start/resume/save/submit/review) and
// scoring. The attempt state machine is: not_started -> in_progress ->
// completed; incomplete attempts that go quiet are simply dormant.

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        attempt::{AttemptResult, ExamAttempt, ReviewItem, SaveProgressRequest, SubmitAttemptRequest},
        exam::Exam,
        question::PublicQuestion,
    },
    utils::jwt::Claims,
};

/// Outcome of the enrollment gate. Denial is a normal result, not an error;
/// `required_program` names the program the UI should point the user at.
#[derive(Debug, PartialEq)]
pub struct AccessDecision {
    pub granted: bool,
    pub required_program: Option<i64>,
}

/// Position of "now" relative to an exam's scheduling window.
#[derive(Debug, PartialEq)]
enum WindowState {
    NotOpen,
    Open,
    Closed,
}

/// Evaluates the scheduling window. NULL bounds are open-ended.
fn window_state(
    now: DateTime<Utc>,
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
) -> WindowState {
    if let Some(start) = start_at {
        if now < start {
            return WindowState::NotOpen;
        }
    }
    if let Some(end) = end_at {
        if now > end {
            return WindowState::Closed;
        }
    }
    WindowState::Open
}

/// Pure access decision over already-fetched entitlements.
///
/// A global exam is granted by any active enrollment; otherwise the enrolled
/// program set must contain the exam's program. The legacy premium flag
/// grants access regardless of program.
fn decide_access(
    enrolled_programs: &[i64],
    premium_active: bool,
    exam_program: Option<i64>,
    is_global: bool,
) -> AccessDecision {
    if premium_active {
        return AccessDecision {
            granted: true,
            required_program: None,
        };
    }

    if is_global {
        return AccessDecision {
            granted: !enrolled_programs.is_empty(),
            required_program: None,
        };
    }

    match exam_program {
        Some(pid) => AccessDecision {
            granted: enrolled_programs.contains(&pid),
            required_program: if enrolled_programs.contains(&pid) {
                None
            } else {
                Some(pid)
            },
        },
        // Exam attached to no program and not global: open to any signed-in user.
        None => AccessDecision {
            granted: true,
            required_program: None,
        },
    }
}

/// Helper row for scoring: the authoritative answer key.
#[derive(sqlx::FromRow)]
struct AnswerKey {
    id: i64,
    correct_answer: String,
    marks: i64,
}

/// Scores an answers map against the authoritative question list.
///
/// Exact string match awards the question's marks; no partial credit, no
/// normalization. Unanswered questions contribute 0; answers for questions
/// no longer in the list are skipped silently. The percentage denominator is
/// always total marks (0 marks -> 0%).
fn score_answers(
    answers: &HashMap<i64, String>,
    keys: &[AnswerKey],
) -> (i64, i64, i64) {
    let total_marks: i64 = keys.iter().map(|k| k.marks).sum();

    let mut score = 0;
    for key in keys {
        if let Some(given) = answers.get(&key.id) {
            if given == &key.correct_answer {
                score += key.marks;
            }
        }
    }

    let percentage = if total_marks > 0 {
        ((score as f64 / total_marks as f64) * 100.0).round() as i64
    } else {
        0
    };

    (score, total_marks, percentage)
}

/// Runs the enrollment gate for a user against an exam.
///
/// Fetches the user's live, non-expired program enrollments plus the legacy
/// premium flag, then applies `decide_access`.
pub async fn check_exam_access(
    pool: &PgPool,
    user_id: i64,
    exam_program: Option<i64>,
    is_global: bool,
) -> Result<AccessDecision, AppError> {
    let enrolled: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT program_id FROM program_enrollments
        WHERE user_id = $1
          AND status IN ('active', 'in_progress')
          AND (expires_at IS NULL OR expires_at > NOW())
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let premium: Option<(bool, Option<DateTime<Utc>>)> =
        sqlx::query_as("SELECT is_premium, premium_expires_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    let now = Utc::now();
    let premium_active = match premium {
        Some((true, None)) => true,
        Some((true, Some(expiry))) => expiry > now,
        _ => false,
    };

    Ok(decide_access(&enrolled, premium_active, exam_program, is_global))
}

async fn fetch_live_exam(pool: &PgPool, exam_id: i64) -> Result<Exam, AppError> {
    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, institution_id, program_id, is_global, title, description, status,
               start_at, end_at, duration_minutes, passing_marks, max_attempts,
               share_slug, is_active, created_at
        FROM exams
        WHERE id = $1 AND is_active = TRUE AND status = 'published'
        "#,
    )
    .bind(exam_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    Ok(exam)
}

fn gate_denied(decision: &AccessDecision) -> AppError {
    match decision.required_program {
        Some(pid) => AppError::Forbidden(format!(
            "not-enrolled: enrollment in program {} is required",
            pid
        )),
        None => AppError::Forbidden("not-enrolled: an active program enrollment is required".to_string()),
    }
}

/// Returns the sanitized question list for an exam the caller may access.
/// Correct answers and explanations never leave the server here.
pub async fn list_exam_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_live_exam(&pool, exam_id).await?;

    let decision =
        check_exam_access(&pool, claims.user_id(), exam.program_id, exam.is_global).await?;
    if !decision.granted {
        return Err(gate_denied(&decision));
    }

    let questions = sqlx::query_as::<_, PublicQuestion>(
        r#"
        SELECT id, content, options, marks, position
        FROM questions
        WHERE exam_id = $1 AND is_active = TRUE
        ORDER BY position, id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(questions))
}

/// Starts (or resumes) an exam attempt.
///
/// Preconditions checked in order: exam published and active, scheduling
/// window open, program gate grants, attempts remaining. Each failure names
/// its condition. An existing incomplete attempt is returned unchanged
/// (sequential idempotency); the row insert, attempt counter bump and
/// enrollment status change happen inside one transaction, and a concurrent
/// duplicate insert fails closed on the partial unique index.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let exam = fetch_live_exam(&pool, exam_id).await?;

    match window_state(Utc::now(), exam.start_at, exam.end_at) {
        WindowState::NotOpen => {
            return Err(AppError::Forbidden(
                "window-not-open: the exam has not started yet".to_string(),
            ));
        }
        WindowState::Closed => {
            return Err(AppError::Forbidden(
                "window-closed: the exam window has ended".to_string(),
            ));
        }
        WindowState::Open => {}
    }

    let decision = check_exam_access(&pool, user_id, exam.program_id, exam.is_global).await?;
    if !decision.granted {
        return Err(gate_denied(&decision));
    }

    // Resume: an incomplete attempt is returned as-is, no duplicate created.
    let existing = sqlx::query_as::<_, ExamAttempt>(
        r#"
        SELECT id, user_id, exam_id, attempt_number, answers, score, passed,
               started_at, completed_at
        FROM exam_attempts
        WHERE user_id = $1 AND exam_id = $2 AND completed_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .fetch_optional(&pool)
    .await?;

    if let Some(attempt) = existing {
        return Ok((StatusCode::OK, Json(attempt)));
    }

    let mut tx = pool.begin().await?;

    // Lazily create the per-exam accounting row, then lock it for the
    // duration of the counter check and bump.
    sqlx::query(
        r#"
        INSERT INTO exam_enrollments (user_id, exam_id, max_attempts)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, exam_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .bind(exam.max_attempts)
    .execute(&mut *tx)
    .await?;

    let (attempts_used, max_attempts): (i32, Option<i32>) = sqlx::query_as(
        r#"
        SELECT attempts_used, max_attempts FROM exam_enrollments
        WHERE user_id = $1 AND exam_id = $2
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(max) = max_attempts {
        if attempts_used >= max {
            return Err(AppError::Forbidden(
                "attempts-exhausted: no attempts remaining for this exam".to_string(),
            ));
        }
    }

    let attempt = sqlx::query_as::<_, ExamAttempt>(
        r#"
        INSERT INTO exam_attempts (user_id, exam_id, attempt_number, answers)
        VALUES ($1, $2, $3, '{}')
        RETURNING id, user_id, exam_id, attempt_number, answers, score, passed,
                  started_at, completed_at
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .bind(attempts_used + 1)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            // Concurrent start slipped past the read above; fail closed.
            AppError::Conflict("An attempt is already in progress".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    sqlx::query(
        r#"
        UPDATE exam_enrollments
        SET attempts_used = attempts_used + 1, status = 'in_progress'
        WHERE user_id = $1 AND exam_id = $2
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .execute(&mut *tx)
    .await?;

    if let Some(program_id) = exam.program_id {
        sqlx::query(
            r#"
            UPDATE program_enrollments SET status = 'in_progress'
            WHERE user_id = $1 AND program_id = $2 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(program_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(attempt)))
}

async fn fetch_owned_attempt(
    pool: &PgPool,
    attempt_id: i64,
    claims: &Claims,
) -> Result<ExamAttempt, AppError> {
    let attempt = sqlx::query_as::<_, ExamAttempt>(
        r#"
        SELECT id, user_id, exam_id, attempt_number, answers, score, passed,
               started_at, completed_at
        FROM exam_attempts
        WHERE id = $1
        "#,
    )
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.user_id != claims.user_id() && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "You do not own this attempt".to_string(),
        ));
    }

    Ok(attempt)
}

/// Saves attempt progress: the answers map is overwritten wholesale
/// (last-write-wins, no merge). Only allowed while incomplete.
pub async fn save_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SaveProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    fetch_owned_attempt(&pool, attempt_id, &claims).await?;

    let result = sqlx::query(
        r#"
        UPDATE exam_attempts SET answers = $1
        WHERE id = $2 AND completed_at IS NULL
        "#,
    )
    .bind(sqlx::types::Json(&payload.answers))
    .bind(attempt_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Attempt has already been submitted".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({ "saved": true })))
}

/// Submits an attempt: scores the answers and flips the attempt to completed.
///
/// The completion flip re-checks `completed_at IS NULL` inside the UPDATE, so
/// a second submit loses the race and gets a 409 instead of rescoring.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_owned_attempt(&pool, attempt_id, &claims).await?;

    if attempt.completed_at.is_some() {
        return Err(AppError::Conflict(
            "Attempt has already been submitted".to_string(),
        ));
    }

    let answers = payload.answers.unwrap_or_else(|| attempt.answers.0.clone());

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, institution_id, program_id, is_global, title, description, status,
               start_at, end_at, duration_minutes, passing_marks, max_attempts,
               share_slug, is_active, created_at
        FROM exams WHERE id = $1
        "#,
    )
    .bind(attempt.exam_id)
    .fetch_one(&pool)
    .await?;

    let keys = sqlx::query_as::<_, AnswerKey>(
        r#"
        SELECT id, correct_answer, marks FROM questions
        WHERE exam_id = $1 AND is_active = TRUE
        "#,
    )
    .bind(attempt.exam_id)
    .fetch_all(&pool)
    .await?;

    let (score, total_marks, percentage) = score_answers(&answers, &keys);
    let passed = score >= exam.passing_marks;

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE exam_attempts
        SET answers = $1, score = $2, passed = $3, completed_at = NOW()
        WHERE id = $4 AND completed_at IS NULL
        "#,
    )
    .bind(sqlx::types::Json(&answers))
    .bind(score)
    .bind(passed)
    .bind(attempt_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Attempt has already been submitted".to_string(),
        ));
    }

    sqlx::query(
        r#"
        UPDATE exam_enrollments SET status = 'completed'
        WHERE user_id = $1 AND exam_id = $2
        "#,
    )
    .bind(attempt.user_id)
    .bind(attempt.exam_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(AttemptResult {
        attempt_id,
        score,
        total_marks,
        percentage,
        passed,
    }))
}

/// Post-completion review: per-question breakdown with correct answers and
/// stored explanations. Only available once the attempt is completed.
pub async fn review_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_owned_attempt(&pool, attempt_id, &claims).await?;

    if attempt.completed_at.is_none() {
        return Err(AppError::Validation(
            "Attempt has not been submitted yet".to_string(),
        ));
    }

    let questions: Vec<(i64, String, String, i64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT id, content, correct_answer, marks, explanation FROM questions
        WHERE exam_id = $1 AND is_active = TRUE
        ORDER BY position, id
        "#,
    )
    .bind(attempt.exam_id)
    .fetch_all(&pool)
    .await?;

    let items: Vec<ReviewItem> = questions
        .into_iter()
        .map(|(id, content, correct_answer, marks, explanation)| {
            let your_answer = attempt.answers.0.get(&id).cloned();
            let correct = your_answer.as_deref() == Some(correct_answer.as_str());
            ReviewItem {
                question_id: id,
                content,
                your_answer,
                correct,
                marks_awarded: if correct { marks } else { 0 },
                marks,
                correct_answer,
                explanation,
            }
        })
        .collect();

    Ok(Json(serde_json::json!({
        "attempt_id": attempt.id,
        "score": attempt.score,
        "passed": attempt.passed,
        "questions": items,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(id: i64, answer: &str, marks: i64) -> AnswerKey {
        AnswerKey {
            id,
            correct_answer: answer.to_string(),
            marks,
        }
    }

    #[test]
    fn scoring_two_of_three_below_passing() {
        // passing_marks = 40 with three 1-mark questions: 2 correct is a fail.
        let keys = vec![key(1, "A", 1), key(2, "B", 1), key(3, "C", 1)];
        let mut answers = HashMap::new();
        answers.insert(1, "A".to_string());
        answers.insert(2, "B".to_string());
        answers.insert(3, "D".to_string());

        let (score, total, percentage) = score_answers(&answers, &keys);
        assert_eq!(score, 2);
        assert_eq!(total, 3);
        assert_eq!(percentage, 67);
        assert!(score < 40);
    }

    #[test]
    fn scoring_is_deterministic() {
        let keys = vec![key(1, "A", 5), key(2, "B", 5)];
        let mut answers = HashMap::new();
        answers.insert(1, "A".to_string());

        let first = score_answers(&answers, &keys);
        let second = score_answers(&answers, &keys);
        assert_eq!(first, second);
        assert_eq!(first, (5, 10, 50));
    }

    #[test]
    fn scoring_skips_removed_questions() {
        // Answer for question 99 has no matching key: skipped silently.
        let keys = vec![key(1, "A", 2)];
        let mut answers = HashMap::new();
        answers.insert(1, "A".to_string());
        answers.insert(99, "A".to_string());

        let (score, total, _) = score_answers(&answers, &keys);
        assert_eq!(score, 2);
        assert_eq!(total, 2);
    }

    #[test]
    fn scoring_no_normalization() {
        let keys = vec![key(1, "Paris", 1)];
        let mut answers = HashMap::new();
        answers.insert(1, "paris ".to_string());

        let (score, _, _) = score_answers(&answers, &keys);
        assert_eq!(score, 0);
    }

    #[test]
    fn scoring_empty_exam_is_zero_percent() {
        let answers = HashMap::new();
        assert_eq!(score_answers(&answers, &[]), (0, 0, 0));
    }

    #[test]
    fn window_open_ended_when_null() {
        let now = Utc::now();
        assert_eq!(window_state(now, None, None), WindowState::Open);
    }

    #[test]
    fn window_not_open_before_start() {
        let now = Utc::now();
        let start = now + Duration::hours(1);
        assert_eq!(window_state(now, Some(start), None), WindowState::NotOpen);
    }

    #[test]
    fn window_closed_after_end() {
        let now = Utc::now();
        let end = now - Duration::hours(1);
        assert_eq!(window_state(now, None, Some(end)), WindowState::Closed);
    }

    #[test]
    fn window_open_inside_bounds() {
        let now = Utc::now();
        let start = now - Duration::hours(1);
        let end = now + Duration::hours(1);
        assert_eq!(window_state(now, Some(start), Some(end)), WindowState::Open);
    }

    #[test]
    fn gate_denies_without_enrollment_or_premium() {
        let decision = decide_access(&[], false, Some(7), false);
        assert!(!decision.granted);
        assert_eq!(decision.required_program, Some(7));
    }

    #[test]
    fn gate_grants_matching_program() {
        let decision = decide_access(&[3, 7], false, Some(7), false);
        assert!(decision.granted);
        assert_eq!(decision.required_program, None);
    }

    #[test]
    fn gate_global_exam_accepts_any_enrollment() {
        assert!(decide_access(&[3], false, Some(7), true).granted);
        assert!(!decide_access(&[], false, Some(7), true).granted);
    }

    #[test]
    fn gate_premium_overrides_everything() {
        let decision = decide_access(&[], true, Some(7), false);
        assert!(decision.granted);
    }

    #[test]
    fn gate_unattached_exam_is_open() {
        assert!(decide_access(&[], false, None, false).granted);
    }
}
