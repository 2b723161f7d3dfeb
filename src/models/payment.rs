// src/models/payment.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'payments' table.
///
/// Created with status 'pending' before the gateway call; updated to
/// 'completed' or 'failed' by the signed verify callback or admin approval.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    /// Amount in minor currency units.
    pub amount: i64,
    /// 'pending' | 'completed' | 'failed'.
    pub status: String,
    /// 'pending' | 'approved' | 'rejected' (manual review track).
    pub approval_status: String,
    /// 'gateway' | 'manual'.
    pub method: String,
    pub gateway_reference: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for initiating an enrollment purchase.
#[derive(Debug, Deserialize, Validate)]
pub struct EnrollRequest {
    #[validate(length(min = 1, max = 20))]
    pub program_ids: Vec<i64>,
}

/// Body of the signed gateway verification callback.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub payment_id: i64,
    pub gateway_reference: String,
    /// 'completed' or 'failed', as reported by the gateway.
    pub status: String,
}

/// DTO for admin manual enrollment (e.g., bank transfer or scholarship).
#[derive(Debug, Deserialize, Validate)]
pub struct ManualEnrollRequest {
    pub user_id: i64,
    pub program_id: i64,
    #[validate(range(min = 0))]
    pub amount: Option<i64>,
}
