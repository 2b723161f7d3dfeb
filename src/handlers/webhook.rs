// src/handlers/webhook.rs

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    config::Config,
    error::AppError,
    models::automation::InboundEmailPayload,
    utils::signature::verify_signature,
};

/// Inbound email webhook.
///
/// The raw body is authenticated by `X-Webhook-Signature` (hex HMAC-SHA256
/// with the shared secret, constant-time compare); a bad signature is a 401
/// with nothing written. Delivery is idempotent on messageId: a replay after
/// a successful first delivery reports "already processed" without a second
/// insert.
pub async fn email_received(
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
        tracing::warn!("Rejected email webhook with bad signature");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    let payload: InboundEmailPayload = serde_json::from_slice(&body)?;

    if payload.message_id.is_empty() {
        return Err(AppError::Validation("messageId is required".to_string()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO inbound_emails (message_id, sender, subject, body)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (message_id) DO NOTHING
        "#,
    )
    .bind(&payload.message_id)
    .bind(&payload.from)
    .bind(&payload.subject)
    .bind(&payload.body)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store inbound email: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "message": "already processed" })),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "accepted" })),
    ))
}
