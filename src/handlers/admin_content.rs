// src/handlers/admin_content.rs
//
// Admin console: website content (blog posts, testimonials) and notification
// automation rules. Rule evaluation against live events belongs to the
// external dispatcher; only the match operation lives here.

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
        automation::{
            AutomationRule, CreateRuleRequest, KNOWN_TRIGGERS, MatchRequest, UpdateRuleRequest,
        },
        content::{
            BlogPost, CreateBlogPostRequest, CreateTestimonialRequest, Testimonial,
            UpdateBlogPostRequest,
        },
    },
    utils::html::clean_html,
};

// ---------------------------------------------------------------------------
// Blog posts
// ---------------------------------------------------------------------------

/// Lists all blog posts, drafts included.
pub async fn list_posts(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let posts = sqlx::query_as::<_, BlogPost>(
        r#"
        SELECT id, title, slug, content, is_published, created_at, updated_at
        FROM blog_posts
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(posts))
}

/// Creates a blog post. The HTML body is sanitized before storage.
pub async fn create_post(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateBlogPostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let sanitized = clean_html(&payload.content);

    let post = sqlx::query_as::<_, BlogPost>(
        r#"
        INSERT INTO blog_posts (title, slug, content, is_published)
        VALUES ($1, $2, $3, $4)
        RETURNING id, title, slug, content, is_published, created_at, updated_at
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.slug)
    .bind(&sanitized)
    .bind(payload.is_published)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Slug '{}' already exists", payload.slug))
        } else {
            tracing::error!("Failed to create blog post: {:?}", e);
            AppError::Internal(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// Updates a blog post by id.
pub async fn update_post(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBlogPostRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.is_none()
        && payload.slug.is_none()
        && payload.content.is_none()
        && payload.is_published.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE blog_posts SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }
    if let Some(slug) = payload.slug {
        separated.push("slug = ");
        separated.push_bind_unseparated(slug);
    }
    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(clean_html(&content));
    }
    if let Some(is_published) = payload.is_published {
        separated.push("is_published = ");
        separated.push_bind_unseparated(is_published);
    }
    separated.push("updated_at = NOW()");

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Slug already exists".to_string())
        } else {
            tracing::error!("Failed to update blog post: {:?}", e);
            AppError::Internal(e.to_string())
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a blog post.
pub async fn delete_post(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM blog_posts WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Testimonials
// ---------------------------------------------------------------------------

/// Creates a testimonial.
pub async fn create_testimonial(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTestimonialRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let testimonial = sqlx::query_as::<_, Testimonial>(
        r#"
        INSERT INTO testimonials (author, quote, rating)
        VALUES ($1, $2, $3)
        RETURNING id, author, quote, rating, is_active, created_at
        "#,
    )
    .bind(&payload.author)
    .bind(&payload.quote)
    .bind(payload.rating.unwrap_or(5))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(testimonial)))
}

/// Soft-deletes a testimonial.
pub async fn delete_testimonial(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE testimonials SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Testimonial not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Automation rules
// ---------------------------------------------------------------------------

/// Decides whether a rule's conditions are satisfied by an event payload.
///
/// Semantics: exact top-level key/value subset match. Every key in the
/// conditions object must exist in the payload with an equal JSON value.
/// An empty or non-object conditions value matches everything. Deliberately
/// minimal; no nesting, no operators.
pub fn conditions_match(conditions: &serde_json::Value, payload: &serde_json::Value) -> bool {
    let Some(wanted) = conditions.as_object() else {
        return true;
    };
    if wanted.is_empty() {
        return true;
    }

    let Some(given) = payload.as_object() else {
        return false;
    };

    wanted
        .iter()
        .all(|(key, value)| given.get(key) == Some(value))
}

const RULE_COLUMNS: &str =
    "id, name, trigger_event, conditions, subject, body, is_active, created_at";

/// Lists all automation rules.
pub async fn list_rules(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let rules = sqlx::query_as::<_, AutomationRule>(&format!(
        "SELECT {} FROM automation_rules ORDER BY id",
        RULE_COLUMNS
    ))
    .fetch_all(&pool)
    .await?;

    Ok(Json(rules))
}

/// Creates an automation rule.
pub async fn create_rule(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if !KNOWN_TRIGGERS.contains(&payload.trigger_event.as_str()) {
        return Err(AppError::Validation(format!(
            "Unknown trigger '{}'",
            payload.trigger_event
        )));
    }

    let conditions = payload
        .conditions
        .unwrap_or_else(|| serde_json::json!({}));

    let rule = sqlx::query_as::<_, AutomationRule>(&format!(
        r#"
        INSERT INTO automation_rules (name, trigger_event, conditions, subject, body)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        RULE_COLUMNS
    ))
    .bind(&payload.name)
    .bind(&payload.trigger_event)
    .bind(sqlx::types::Json(conditions))
    .bind(&payload.subject)
    .bind(&payload.body)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(rule)))
}

/// Updates an automation rule by id.
pub async fn update_rule(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(trigger) = &payload.trigger_event {
        if !KNOWN_TRIGGERS.contains(&trigger.as_str()) {
            return Err(AppError::Validation(format!("Unknown trigger '{}'", trigger)));
        }
    }

    if payload.name.is_none()
        && payload.trigger_event.is_none()
        && payload.conditions.is_none()
        && payload.subject.is_none()
        && payload.body.is_none()
        && payload.is_active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE automation_rules SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }
    if let Some(trigger) = payload.trigger_event {
        separated.push("trigger_event = ");
        separated.push_bind_unseparated(trigger);
    }
    if let Some(conditions) = payload.conditions {
        separated.push("conditions = ");
        separated.push_bind_unseparated(sqlx::types::Json(conditions));
    }
    if let Some(subject) = payload.subject {
        separated.push("subject = ");
        separated.push_bind_unseparated(subject);
    }
    if let Some(body) = payload.body {
        separated.push("body = ");
        separated.push_bind_unseparated(body);
    }
    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Rule not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes an automation rule.
pub async fn delete_rule(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM automation_rules WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Rule not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Returns the active rules that fire for an event: trigger equality plus
/// condition subset match. The dispatcher that renders and sends templates
/// is an external collaborator.
pub async fn match_rules(
    State(pool): State<PgPool>,
    Json(payload): Json<MatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let candidates = sqlx::query_as::<_, AutomationRule>(&format!(
        "SELECT {} FROM automation_rules WHERE trigger_event = $1 AND is_active = TRUE ORDER BY id",
        RULE_COLUMNS
    ))
    .bind(&payload.trigger_event)
    .fetch_all(&pool)
    .await?;

    let matched: Vec<AutomationRule> = candidates
        .into_iter()
        .filter(|rule| conditions_match(&rule.conditions.0, &payload.payload))
        .collect();

    Ok(Json(matched))
}

#[cfg(test)]
mod tests {
    use super::conditions_match;
    use serde_json::json;

    #[test]
    fn empty_conditions_match_everything() {
        assert!(conditions_match(&json!({}), &json!({"plan": "jee"})));
        assert!(conditions_match(&json!(null), &json!({})));
    }

    #[test]
    fn subset_match_ignores_extra_payload_keys() {
        let conditions = json!({"plan": "jee"});
        let payload = json!({"plan": "jee", "source": "web"});
        assert!(conditions_match(&conditions, &payload));
    }

    #[test]
    fn value_mismatch_rejects() {
        let conditions = json!({"plan": "jee"});
        assert!(!conditions_match(&conditions, &json!({"plan": "neet"})));
    }

    #[test]
    fn missing_key_rejects() {
        let conditions = json!({"plan": "jee"});
        assert!(!conditions_match(&conditions, &json!({"source": "web"})));
    }

    #[test]
    fn values_compare_exactly_not_loosely() {
        // "5" and 5 are different JSON values.
        let conditions = json!({"rating": 5});
        assert!(!conditions_match(&conditions, &json!({"rating": "5"})));
        assert!(conditions_match(&conditions, &json!({"rating": 5})));
    }

    #[test]
    fn non_object_payload_rejects_non_empty_conditions() {
        assert!(!conditions_match(&json!({"k": 1}), &json!("scalar")));
    }
}
