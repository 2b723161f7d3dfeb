// src/handlers/admin.rs
//
// Admin console: user management, institutions, programs and program-admin
// assignment. Role rules: super_admin is unrestricted; admin may not delete
// or demote super_admins, may not delete their own account, and may not
// create or deactivate programs. Program edits by a non-super admin require
// a program_admins assignment.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        institution::{CreateInstitutionRequest, Institution, UpdateInstitutionRequest},
        program::{CreateProgramRequest, Program, UpdateProgramRequest},
        user::User,
    },
    utils::{hash::hash_password, jwt::Claims},
};

/// True when the user holds a program_admins assignment for the program.
pub async fn is_program_admin(
    pool: &PgPool,
    user_id: i64,
    program_id: i64,
) -> Result<bool, AppError> {
    let assigned: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM program_admins WHERE user_id = $1 AND program_id = $2)",
    )
    .bind(user_id)
    .bind(program_id)
    .fetch_one(pool)
    .await?;

    Ok(assigned)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Lists all users.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role, is_premium, premium_expires_at, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    Ok(Json(users))
}

/// DTO for an admin creating a user (can specify role).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(length(min = 4, max = 128))]
    pub password: String,
    /// 'user', 'admin' or 'super_admin'.
    pub role: String,
}

/// Creates a user with a specific role.
/// Only a super_admin may mint another super_admin.
pub async fn create_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if !["user", "admin", "super_admin"].contains(&payload.role.as_str()) {
        return Err(AppError::Validation(format!(
            "Unknown role '{}'",
            payload.role
        )));
    }

    if payload.role == "super_admin" && !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can create super admins".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.password)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, password, role)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(&payload.role)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::Internal(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub role: Option<String>,
    pub password: Option<String>,
    pub is_premium: Option<bool>,
    pub premium_expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Updates a user's role, password or legacy premium flag.
pub async fn update_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target_role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    // Touching a super_admin (including demotion) is super_admin-only.
    if target_role == "super_admin" && !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can modify super admins".to_string(),
        ));
    }

    if let Some(new_role) = &payload.role {
        if !["user", "admin", "super_admin"].contains(&new_role.as_str()) {
            return Err(AppError::Validation(format!("Unknown role '{}'", new_role)));
        }
        if new_role == "super_admin" && !claims.is_super_admin() {
            return Err(AppError::Forbidden(
                "Only a super admin can promote to super admin".to_string(),
            ));
        }
        sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(new_role)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_password) = &payload.password {
        let hashed = hash_password(new_password)?;
        sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(hashed)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(is_premium) = payload.is_premium {
        sqlx::query("UPDATE users SET is_premium = $1, premium_expires_at = $2 WHERE id = $3")
            .bind(is_premium)
            .bind(payload.premium_expires_at)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a user.
/// Self-deletion is refused; deleting an admin or super_admin requires
/// super_admin.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id() {
        return Err(AppError::Validation("Cannot delete yourself".to_string()));
    }

    let target_role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    if target_role != "user" && !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can delete admin accounts".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::Internal(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Institutions
// ---------------------------------------------------------------------------

/// Creates a new institution.
pub async fn create_institution(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateInstitutionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let institution = sqlx::query_as::<_, Institution>(
        r#"
        INSERT INTO institutions (name, description, logo_url)
        VALUES ($1, $2, $3)
        RETURNING id, name, description, logo_url, is_active, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(payload.description.as_deref().unwrap_or(""))
    .bind(&payload.logo_url)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create institution: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(institution)))
}

/// Updates an institution by id.
pub async fn update_institution(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateInstitutionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.is_none()
        && payload.description.is_none()
        && payload.logo_url.is_none()
        && payload.is_active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE institutions SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(logo_url) = payload.logo_url {
        separated.push("logo_url = ");
        separated.push_bind_unseparated(logo_url);
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update institution: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Institution not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Soft-deletes an institution.
pub async fn delete_institution(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE institutions SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Institution not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

/// Creates a new program. Super admin only.
pub async fn create_program(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateProgramRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can create programs".to_string(),
        ));
    }
    payload.validate()?;

    let program = sqlx::query_as::<_, Program>(
        r#"
        INSERT INTO programs (code, name, price, duration_months)
        VALUES ($1, $2, $3, $4)
        RETURNING id, code, name, price, duration_months, is_active, created_at
        "#,
    )
    .bind(&payload.code)
    .bind(&payload.name)
    .bind(payload.price)
    .bind(payload.duration_months)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Program code '{}' already exists", payload.code))
        } else {
            tracing::error!("Failed to create program: {:?}", e);
            AppError::Internal(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(program)))
}

/// Updates a program. Non-super admins need a program_admins assignment.
pub async fn update_program(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProgramRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_super_admin() && !is_program_admin(&pool, claims.user_id(), id).await? {
        return Err(AppError::Forbidden(
            "You are not assigned to this program".to_string(),
        ));
    }

    if payload.name.is_none()
        && payload.price.is_none()
        && payload.duration_months.is_none()
        && payload.is_active.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE programs SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(price) = payload.price {
        separated.push("price = ");
        separated.push_bind_unseparated(price);
    }

    if let Some(duration_months) = payload.duration_months {
        separated.push("duration_months = ");
        separated.push_bind_unseparated(duration_months);
    }

    if let Some(is_active) = payload.is_active {
        // Reactivation via update is fine; deactivation goes through delete.
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update program: {:?}", e);
        AppError::Internal(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Program not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deactivates a program. Programs are never physically deleted.
/// Super admin only.
pub async fn delete_program(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can deactivate programs".to_string(),
        ));
    }

    let result = sqlx::query("UPDATE programs SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Program not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DTO for assigning a program admin.
#[derive(Debug, Deserialize)]
pub struct AssignProgramAdminRequest {
    pub user_id: i64,
}

/// Assigns a user as program admin. Super admin only.
pub async fn assign_program_admin(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(program_id): Path<i64>,
    Json(payload): Json<AssignProgramAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can assign program admins".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO program_admins (user_id, program_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(payload.user_id)
    .bind(program_id)
    .execute(&pool)
    .await?;

    Ok(StatusCode::CREATED)
}

/// Removes a program admin assignment. Super admin only.
pub async fn remove_program_admin(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((program_id, user_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can remove program admins".to_string(),
        ));
    }

    let result = sqlx::query(
        "DELETE FROM program_admins WHERE program_id = $1 AND user_id = $2",
    )
    .bind(program_id)
    .bind(user_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Assignment not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
