// src/models/content.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'blog_posts' table.
/// Content is sanitized HTML (see utils::html::clean_html).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    /// Unique URL slug; collisions are a 409.
    pub slug: String,
    pub content: String,
    pub is_published: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a blog post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBlogPostRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(min = 1, max = 200))]
    pub slug: String,
    #[validate(length(min = 1, max = 100000))]
    pub content: String,
    #[serde(default)]
    pub is_published: bool,
}

/// DTO for updating a blog post. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateBlogPostRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
}

/// Represents the 'testimonials' table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Testimonial {
    pub id: i64,
    pub author: String,
    pub quote: String,
    pub rating: i32,
    pub is_active: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a testimonial.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTestimonialRequest {
    #[validate(length(min = 1, max = 200))]
    pub author: String,
    #[validate(length(min = 1, max = 5000))]
    pub quote: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<i32>,
}
