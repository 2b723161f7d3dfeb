// src/handlers/content.rs
//
// Public website content: blog posts and testimonials.

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::content::{BlogPost, Testimonial},
};

/// Lists published blog posts, newest first.
pub async fn list_posts(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let posts = sqlx::query_as::<_, BlogPost>(
        r#"
        SELECT id, title, slug, content, is_published, created_at, updated_at
        FROM blog_posts
        WHERE is_published = TRUE
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(posts))
}

/// Gets a published blog post by slug.
pub async fn get_post(
    State(pool): State<PgPool>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = sqlx::query_as::<_, BlogPost>(
        r#"
        SELECT id, title, slug, content, is_published, created_at, updated_at
        FROM blog_posts
        WHERE slug = $1 AND is_published = TRUE
        "#,
    )
    .bind(&slug)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Post not found".to_string()))?;

    Ok(Json(post))
}

/// Lists active testimonials.
pub async fn list_testimonials(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let testimonials = sqlx::query_as::<_, Testimonial>(
        r#"
        SELECT id, author, quote, rating, is_active, created_at
        FROM testimonials
        WHERE is_active = TRUE
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(testimonials))
}
