// src/models/automation.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

pub const KNOWN_TRIGGERS: &[&str] = &[
    "user_registration",
    "feedback_submitted",
    "study_plan_created",
    "custom",
];

/// Represents the 'automation_rules' table: trigger -> conditions -> template
/// records consumed by the (external) notification dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AutomationRule {
    pub id: i64,
    pub name: String,

    /// One of KNOWN_TRIGGERS. Stored as 'trigger_event'; exposed as 'trigger'.
    #[sqlx(rename = "trigger_event")]
    #[serde(rename = "trigger")]
    pub trigger_event: String,

    /// Free-form JSON conditions. Matching is an exact top-level key/value
    /// subset check against the event payload; an empty object matches all.
    pub conditions: Json<serde_json::Value>,

    /// Notification template.
    pub subject: String,
    pub body: String,

    pub is_active: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating an automation rule.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(rename = "trigger")]
    pub trigger_event: String,
    pub conditions: Option<serde_json::Value>,
    #[validate(length(min = 1, max = 500))]
    pub subject: String,
    #[validate(length(min = 1, max = 20000))]
    pub body: String,
}

/// DTO for updating a rule. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    #[serde(rename = "trigger")]
    pub trigger_event: Option<String>,
    pub conditions: Option<serde_json::Value>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_active: Option<bool>,
}

/// DTO for the rule-match operation: which active rules fire for this event?
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    #[serde(rename = "trigger")]
    pub trigger_event: String,
    pub payload: serde_json::Value,
}

/// Represents the 'inbound_emails' table, the idempotency ledger for the
/// email-received webhook.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InboundEmail {
    pub id: i64,
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Payload of the email-received webhook.
#[derive(Debug, Deserialize)]
pub struct InboundEmailPayload {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}
