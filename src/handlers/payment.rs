// src/handlers/payment.rs
//
// Program enrollment purchase flow. The payment row is created before the
// gateway call; the gateway reports back through a signed verify callback.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{Months, Utc};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::{
        payment::{EnrollRequest, Payment, VerifyPaymentRequest},
        program::Program,
    },
    utils::{jwt::Claims, signature::verify_signature},
};

/// Initiates enrollment into one or more programs.
///
/// Creates a pending payment plus one pending_approval enrollment per
/// program in a single transaction. A program the user already has a live
/// enrollment in is a 409. Free carts (total price 0) activate immediately.
pub async fn enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<EnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id();

    let mut programs = Vec::new();
    for program_id in &payload.program_ids {
        let program = sqlx::query_as::<_, Program>(
            r#"
            SELECT id, code, name, price, duration_months, is_active, created_at
            FROM programs
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(program_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound(format!("Program {} not found", program_id)))?;
        programs.push(program);
    }

    let amount: i64 = programs.iter().map(|p| p.price).sum();
    let free = amount == 0;

    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (user_id, amount, status, approval_status, method)
        VALUES ($1, $2, $3, $4, 'gateway')
        RETURNING id, user_id, amount, status, approval_status, method,
                  gateway_reference, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(if free { "completed" } else { "pending" })
    .bind(if free { "approved" } else { "pending" })
    .fetch_one(&mut *tx)
    .await?;

    for program in &programs {
        let expires_at = if free {
            Utc::now().checked_add_months(Months::new(program.duration_months as u32))
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO program_enrollments (user_id, program_id, status, expires_at, payment_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(program.id)
        .bind(if free { "active" } else { "pending_approval" })
        .bind(expires_at)
        .bind(payment.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Already enrolled in program '{}'",
                    program.code
                ))
            } else {
                AppError::from(e)
            }
        })?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// Gateway verification callback.
///
/// Unauthenticated but signed: the raw body must carry a valid
/// `X-Webhook-Signature` (hex HMAC-SHA256 with the shared secret, verified in
/// constant time). On 'completed', the payment and its enrollments are
/// activated inside one transaction; expiry is computed from each program's
/// duration. Replays of an already-settled payment report "already processed".
pub async fn verify_payment(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get("X-Webhook-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized("Missing signature".to_string()))?;

    if !verify_signature(&config.webhook_secret, &body, signature) {
        tracing::warn!("Rejected payment callback with bad signature");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    let payload: VerifyPaymentRequest = serde_json::from_slice(&body)?;

    if payload.status != "completed" && payload.status != "failed" {
        return Err(AppError::Validation(format!(
            "Unknown gateway status '{}'",
            payload.status
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
    .bind(payload.payment_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Payment not found".to_string()))?;

    if payment.status != "pending" {
        return Ok(Json(serde_json::json!({
            "message": "already processed",
            "status": payment.status,
        })));
    }

    sqlx::query(
        r#"
        UPDATE payments
        SET status = $1, gateway_reference = $2, updated_at = NOW(),
            approval_status = CASE WHEN $1 = 'completed' THEN 'approved' ELSE approval_status END
        WHERE id = $3
        "#,
    )
    .bind(&payload.status)
    .bind(&payload.gateway_reference)
    .bind(payment.id)
    .execute(&mut *tx)
    .await?;

    if payload.status == "completed" {
        activate_enrollments(&mut tx, payment.id).await?;
    }

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "message": "verified",
        "status": payload.status,
    })))
}

/// Activates every enrollment attached to a settled payment, stamping
/// expiry from the program's duration.
pub async fn activate_enrollments(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment_id: i64,
) -> Result<(), AppError> {
    let rows: Vec<(i64, i32)> = sqlx::query_as(
        r#"
        SELECT e.id, p.duration_months
        FROM program_enrollments e
        JOIN programs p ON e.program_id = p.id
        WHERE e.payment_id = $1 AND e.status = 'pending_approval'
        "#,
    )
    .bind(payment_id)
    .fetch_all(&mut **tx)
    .await?;

    for (enrollment_id, duration_months) in rows {
        let expires_at = Utc::now()
            .checked_add_months(Months::new(duration_months as u32))
            .ok_or_else(|| AppError::Internal("Enrollment expiry overflow".to_string()))?;

        sqlx::query(
            r#"
            UPDATE program_enrollments SET status = 'active', expires_at = $1
            WHERE id = $2
            "#,
        )
        .bind(expires_at)
        .bind(enrollment_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
