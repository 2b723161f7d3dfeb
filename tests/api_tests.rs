// tests/api_tests.rs

use oprep_backend::{config::Config, routes, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;

/// Helper to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    // Note: requires a running Postgres reachable via DATABASE_URL.
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        webhook_secret: "test_webhook_secret".to_string(),
        rust_log: "error".to_string(),
        port: 0,
        admin_username: None,
        admin_password: None,
    };

    let state = AppState { pool, config };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

async fn test_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test DB")
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Registers and logs in a fresh user; returns (username, token).
async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, String) {
    let username = unique("u");
    let password = "password123";

    let resp = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(resp.status().as_u16(), 201);

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");

    let token = login["token"].as_str().expect("Token not found").to_string();
    (username, token)
}

/// Promotes a user to super_admin directly in the database and returns a
/// fresh token carrying the new role.
async fn make_super_admin(
    client: &reqwest::Client,
    address: &str,
    pool: &PgPool,
    username: &str,
) -> String {
    sqlx::query("UPDATE users SET role = 'super_admin' WHERE username = $1")
        .bind(username)
        .execute(pool)
        .await
        .unwrap();

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    login["token"].as_str().unwrap().to_string()
}

/// Creates a program, an exam attached to it with three 1-mark questions,
/// publishes it, and returns (program_id, exam_id).
async fn seed_published_exam(
    client: &reqwest::Client,
    address: &str,
    admin_token: &str,
    passing_marks: i64,
    max_attempts: Option<i32>,
) -> (i64, i64) {
    let program: serde_json::Value = client
        .post(format!("{}/api/admin/programs", address))
        .bearer_auth(admin_token)
        .json(&serde_json::json!({
            "code": unique("prog"),
            "name": "Test Program",
            "price": 4999,
            "duration_months": 6
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let program_id = program["id"].as_i64().unwrap();

    let exam: serde_json::Value = client
        .post(format!("{}/api/admin/exams", address))
        .bearer_auth(admin_token)
        .json(&serde_json::json!({
            "program_id": program_id,
            "title": "Mock Test 1",
            "passing_marks": passing_marks,
            "max_attempts": max_attempts
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let exam_id = exam["id"].as_i64().unwrap();

    for (i, correct) in ["A", "B", "C"].iter().enumerate() {
        let resp = client
            .post(format!("{}/api/admin/questions", address))
            .bearer_auth(admin_token)
            .json(&serde_json::json!({
                "exam_id": exam_id,
                "content": format!("Question {}", i + 1),
                "options": ["A", "B", "C", "D"],
                "correct_answer": correct,
                "marks": 1
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
    }

    let resp = client
        .post(format!("{}/api/admin/exams/{}/publish", address, exam_id))
        .bearer_auth(admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    (program_id, exam_id)
}

/// Enrolls a user into a program via the admin manual-enroll endpoint.
async fn enroll_user(
    client: &reqwest::Client,
    address: &str,
    admin_token: &str,
    pool: &PgPool,
    username: &str,
    program_id: i64,
) {
    let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap();

    let resp = client
        .post(format!("{}/api/admin/enrollments/manual", address))
        .bearer_auth(admin_token)
        .json(&serde_json::json!({ "user_id": user_id, "program_id": program_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
}

#[tokio::test]
async fn health_check_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": unique("u"),
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn register_fails_validation() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Username too short.
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "yo",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (username, _token) = register_and_login(&client, &address).await;

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": "wrong" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn gate_denies_unenrolled_student() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (admin_name, _) = register_and_login(&client, &address).await;
    let admin_token = make_super_admin(&client, &address, &pool, &admin_name).await;
    let (_program_id, exam_id) = seed_published_exam(&client, &address, &admin_token, 2, None).await;

    let (_student, student_token) = register_and_login(&client, &address).await;

    let resp = client
        .post(format!("{}/api/exams/{}/attempts", address, exam_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 403);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not-enrolled"));
}

#[tokio::test]
async fn full_attempt_flow_scores_and_blocks_double_submit() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (admin_name, _) = register_and_login(&client, &address).await;
    let admin_token = make_super_admin(&client, &address, &pool, &admin_name).await;
    // passing_marks = 40 with three 1-mark questions: unreachable by design.
    let (program_id, exam_id) =
        seed_published_exam(&client, &address, &admin_token, 40, None).await;

    let (student, student_token) = register_and_login(&client, &address).await;
    enroll_user(&client, &address, &admin_token, &pool, &student, program_id).await;

    // Question list is sanitized.
    let questions: Vec<serde_json::Value> = client
        .get(format!("{}/api/exams/{}/questions", address, exam_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(questions.len(), 3);
    assert!(questions[0].get("correct_answer").is_none());
    assert!(questions[0].get("explanation").is_none());

    // Start.
    let start = client
        .post(format!("{}/api/exams/{}/attempts", address, exam_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(start.status().as_u16(), 201);
    let attempt: serde_json::Value = start.json().await.unwrap();
    let attempt_id = attempt["id"].as_i64().unwrap();
    assert_eq!(attempt["attempt_number"].as_i64().unwrap(), 1);

    // Resume returns the same attempt, not a duplicate.
    let resume = client
        .post(format!("{}/api/exams/{}/attempts", address, exam_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resume.status().as_u16(), 200);
    let resumed: serde_json::Value = resume.json().await.unwrap();
    assert_eq!(resumed["id"].as_i64().unwrap(), attempt_id);

    // Save progress, then submit with 2 of 3 correct.
    let mut answers: HashMap<String, String> = HashMap::new();
    for q in &questions {
        answers.insert(q["id"].as_i64().unwrap().to_string(), "A".to_string());
    }
    let save = client
        .patch(format!("{}/api/attempts/{}", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({ "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(save.status().as_u16(), 200);

    let mut final_answers: HashMap<String, String> = HashMap::new();
    final_answers.insert(questions[0]["id"].as_i64().unwrap().to_string(), "A".into());
    final_answers.insert(questions[1]["id"].as_i64().unwrap().to_string(), "B".into());
    final_answers.insert(questions[2]["id"].as_i64().unwrap().to_string(), "D".into());

    let submit = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({ "answers": final_answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(submit.status().as_u16(), 200);
    let result: serde_json::Value = submit.json().await.unwrap();
    assert_eq!(result["score"].as_i64().unwrap(), 2);
    assert_eq!(result["total_marks"].as_i64().unwrap(), 3);
    assert_eq!(result["percentage"].as_i64().unwrap(), 67);
    assert_eq!(result["passed"].as_bool().unwrap(), false);

    // Second submit is refused.
    let again = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({ "answers": final_answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    // Review exposes the breakdown with explanations.
    let review: serde_json::Value = client
        .get(format!("{}/api/attempts/{}/review", address, attempt_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(review["score"].as_i64().unwrap(), 2);
    assert_eq!(review["questions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn attempts_exhausted_after_limit() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (admin_name, _) = register_and_login(&client, &address).await;
    let admin_token = make_super_admin(&client, &address, &pool, &admin_name).await;
    let (program_id, exam_id) =
        seed_published_exam(&client, &address, &admin_token, 1, Some(1)).await;

    let (student, student_token) = register_and_login(&client, &address).await;
    enroll_user(&client, &address, &admin_token, &pool, &student, program_id).await;

    let start = client
        .post(format!("{}/api/exams/{}/attempts", address, exam_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(start.status().as_u16(), 201);
    let attempt: serde_json::Value = start.json().await.unwrap();
    let attempt_id = attempt["id"].as_i64().unwrap();

    let submit = client
        .post(format!("{}/api/attempts/{}/submit", address, attempt_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(submit.status().as_u16(), 200);

    let second = client
        .post(format!("{}/api/exams/{}/attempts", address, exam_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 403);
    let body: serde_json::Value = second.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("attempts-exhausted"));
}

#[tokio::test]
async fn window_not_open_is_named() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (admin_name, _) = register_and_login(&client, &address).await;
    let admin_token = make_super_admin(&client, &address, &pool, &admin_name).await;
    let (program_id, exam_id) = seed_published_exam(&client, &address, &admin_token, 1, None).await;

    // Push the window into the future.
    let resp = client
        .put(format!("{}/api/admin/exams/{}", address, exam_id))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({
            "start_at": chrono_future(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let (student, student_token) = register_and_login(&client, &address).await;
    enroll_user(&client, &address, &admin_token, &pool, &student, program_id).await;

    let start = client
        .post(format!("{}/api/exams/{}/attempts", address, exam_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(start.status().as_u16(), 403);
    let body: serde_json::Value = start.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("window-not-open"));
}

fn chrono_future() -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .checked_add(Duration::from_secs(3600))
        .unwrap()
        .as_secs();
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .unwrap()
        .to_rfc3339()
}
