// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, patch, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{
        admin, admin_content, admin_exams, admin_payments, attempt, auth, catalog, content,
        payment, profile, webhook,
    },
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public browse and auth routes.
/// * Authenticated student routes (attempts, payments, profile).
/// * Signed callback routes (gateway verify, email webhook).
/// * Admin console behind auth + admin middleware.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let catalog_routes = Router::new()
        .route("/institutions", get(catalog::list_institutions))
        .route("/institutions/{id}", get(catalog::get_institution))
        .route("/programs", get(catalog::list_programs))
        .route("/programs/{id}", get(catalog::get_program))
        .route("/exams", get(catalog::list_exams))
        .route("/exams/{id}", get(catalog::get_exam))
        .route("/exams/shared/{slug}", get(catalog::get_shared_exam));

    let content_routes = Router::new()
        .route("/posts", get(content::list_posts))
        .route("/posts/{slug}", get(content::get_post))
        .route("/testimonials", get(content::list_testimonials));

    let student_routes = Router::new()
        .route("/exams/{id}/questions", get(attempt::list_exam_questions))
        .route("/exams/{id}/attempts", post(attempt::start_attempt))
        .route("/attempts/{id}", patch(attempt::save_progress))
        .route("/attempts/{id}/submit", post(attempt::submit_attempt))
        .route("/attempts/{id}/review", get(attempt::review_attempt))
        .route("/payments/enroll", post(payment::enroll))
        .route("/me", get(profile::get_me))
        .route("/me/enrollments", get(profile::list_my_enrollments))
        .route("/me/attempts", get(profile::list_my_attempts))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Signed by shared secret, no session required.
    let callback_routes = Router::new()
        .route("/payments/verify", post(payment::verify_payment))
        .route("/webhooks/email-received", post(webhook::email_received));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/institutions", post(admin::create_institution))
        .route(
            "/institutions/{id}",
            put(admin::update_institution).delete(admin::delete_institution),
        )
        .route("/programs", post(admin::create_program))
        .route(
            "/programs/{id}",
            put(admin::update_program).delete(admin::delete_program),
        )
        .route("/programs/{id}/admins", post(admin::assign_program_admin))
        .route(
            "/programs/{id}/admins/{user_id}",
            delete(admin::remove_program_admin),
        )
        .route(
            "/exams",
            get(admin_exams::list_exams).post(admin_exams::create_exam),
        )
        .route(
            "/exams/{id}",
            put(admin_exams::update_exam).delete(admin_exams::delete_exam),
        )
        .route("/exams/{id}/publish", post(admin_exams::publish_exam))
        .route("/exams/{id}/versions", get(admin_exams::list_exam_versions))
        .route("/exams/{id}/questions", get(admin_exams::list_questions))
        .route("/questions", post(admin_exams::create_question))
        .route(
            "/questions/{id}",
            put(admin_exams::update_question).delete(admin_exams::delete_question),
        )
        .route(
            "/posts",
            get(admin_content::list_posts).post(admin_content::create_post),
        )
        .route(
            "/posts/{id}",
            put(admin_content::update_post).delete(admin_content::delete_post),
        )
        .route("/testimonials", post(admin_content::create_testimonial))
        .route(
            "/testimonials/{id}",
            delete(admin_content::delete_testimonial),
        )
        .route(
            "/automation/rules",
            get(admin_content::list_rules).post(admin_content::create_rule),
        )
        .route(
            "/automation/rules/{id}",
            put(admin_content::update_rule).delete(admin_content::delete_rule),
        )
        .route("/automation/match", post(admin_content::match_rules))
        .route("/payments", get(admin_payments::list_payments))
        .route(
            "/payments/{id}/approval",
            put(admin_payments::review_payment),
        )
        .route("/enrollments", get(admin_payments::list_enrollments))
        .route("/enrollments/manual", post(admin_payments::manual_enroll))
        .route(
            "/enrollments/expire",
            post(admin_payments::expire_enrollments),
        )
        // Double middleware protection: auth first, then admin check.
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .merge(Router::new().nest("/api", catalog_routes))
        .nest("/api/content", content_routes)
        .merge(Router::new().nest("/api", student_routes))
        .merge(Router::new().nest("/api", callback_routes))
        .nest("/api/admin", admin_routes)
        // Global middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
