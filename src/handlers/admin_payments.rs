// src/handlers/admin_payments.rs
//
// Admin console: payment review/approval, manual enrollment, and enrollment
// management. Enrollment management for a specific program requires either
// super_admin or a program_admins assignment.

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Months, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::admin::is_program_admin,
    handlers::payment::activate_enrollments,
    models::{
        enrollment::EnrollmentListItem,
        payment::{ManualEnrollRequest, Payment},
        program::Program,
    },
    utils::jwt::Claims,
};

/// Lists payments, newest first.
pub async fn list_payments(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, user_id, amount, status, approval_status, method,
               gateway_reference, created_at, updated_at
        FROM payments
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(payments))
}

/// DTO for reviewing a payment.
#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    /// 'approved' or 'rejected'.
    pub approval_status: String,
}

/// Approves or rejects a pending payment.
///
/// Approval settles the payment and activates its enrollments in one
/// transaction; rejection marks it failed. Already-settled payments report
/// "already processed".
pub async fn review_payment(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<ApprovalRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.approval_status != "approved" && payload.approval_status != "rejected" {
        return Err(AppError::Validation(format!(
            "Unknown approval status '{}'",
            payload.approval_status
        )));
    }

    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, user_id, amount, status, approval_status, method,
               gateway_reference, created_at, updated_at
        FROM payments
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Payment not found".to_string()))?;

    if payment.status != "pending" {
        return Ok(Json(serde_json::json!({
            "message": "already processed",
            "status": payment.status,
        })));
    }

    let approved = payload.approval_status == "approved";

    sqlx::query(
        r#"
        UPDATE payments
        SET approval_status = $1, status = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(&payload.approval_status)
    .bind(if approved { "completed" } else { "failed" })
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if approved {
        activate_enrollments(&mut tx, id).await?;
    }

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "id": id,
        "approval_status": payload.approval_status,
    })))
}

/// Manually enrolls a user into a program (bank transfer, scholarship).
///
/// Records a completed manual payment and an active enrollment with expiry
/// from the program duration, in one transaction.
pub async fn manual_enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ManualEnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if !claims.is_super_admin()
        && !is_program_admin(&pool, claims.user_id(), payload.program_id).await?
    {
        return Err(AppError::Forbidden(
            "You are not assigned to this program".to_string(),
        ));
    }

    let program = sqlx::query_as::<_, Program>(
        r#"
        SELECT id, code, name, price, duration_months, is_active, created_at
        FROM programs
        WHERE id = $1 AND is_active = TRUE
        "#,
    )
    .bind(payload.program_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Program not found".to_string()))?;

    let user_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
        .bind(payload.user_id)
        .fetch_optional(&pool)
        .await?;
    if user_exists.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let expires_at = Utc::now()
        .checked_add_months(Months::new(program.duration_months as u32))
        .ok_or_else(|| AppError::Internal("Enrollment expiry overflow".to_string()))?;

    let mut tx = pool.begin().await?;

    let payment_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO payments (user_id, amount, status, approval_status, method)
        VALUES ($1, $2, 'completed', 'approved', 'manual')
        RETURNING id
        "#,
    )
    .bind(payload.user_id)
    .bind(payload.amount.unwrap_or(program.price))
    .fetch_one(&mut *tx)
    .await?;

    let enrollment_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO program_enrollments (user_id, program_id, status, expires_at, payment_id)
        VALUES ($1, $2, 'active', $3, $4)
        RETURNING id
        "#,
    )
    .bind(payload.user_id)
    .bind(payload.program_id)
    .bind(expires_at)
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("User already has a live enrollment in this program".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "enrollment_id": enrollment_id,
            "payment_id": payment_id,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentListParams {
    pub program_id: Option<i64>,
    pub status: Option<String>,
}

/// Lists program enrollments with user and program context.
/// Filtering to a program requires assignment for non-super admins.
pub async fn list_enrollments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<EnrollmentListParams>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(program_id) = params.program_id {
        if !claims.is_super_admin() && !is_program_admin(&pool, claims.user_id(), program_id).await?
        {
            return Err(AppError::Forbidden(
                "You are not assigned to this program".to_string(),
            ));
        }
    } else if !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Provide a program_id you are assigned to".to_string(),
        ));
    }

    let enrollments = sqlx::query_as::<_, EnrollmentListItem>(
        r#"
        SELECT e.id, e.user_id, u.username, e.program_id, p.code AS program_code,
               p.name AS program_name, e.status, e.expires_at, e.created_at
        FROM program_enrollments e
        JOIN programs p ON e.program_id = p.id
        JOIN users u ON e.user_id = u.id
        WHERE ($1::BIGINT IS NULL OR e.program_id = $1)
          AND ($2::TEXT IS NULL OR e.status = $2)
        ORDER BY e.created_at DESC
        "#,
    )
    .bind(params.program_id)
    .bind(&params.status)
    .fetch_all(&pool)
    .await?;

    Ok(Json(enrollments))
}

/// Marks overdue enrollments expired. Intended to be hit by an external
/// scheduler; idempotent.
pub async fn expire_enrollments(
    State(pool): State<PgPool>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE program_enrollments SET status = 'expired'
        WHERE status IN ('active', 'in_progress')
          AND expires_at IS NOT NULL AND expires_at <= NOW()
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "expired": result.rows_affected(),
    })))
}
