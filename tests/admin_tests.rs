// tests/admin_tests.rs

use oprep_backend::{config::Config, routes, state::AppState, utils::signature::sign_body};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const WEBHOOK_SECRET: &str = "test_webhook_secret";

async fn spawn_app() -> String {
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
        webhook_secret: WEBHOOK_SECRET.to_string(),
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

/// Registers a fresh user with the given role (set directly in the database)
/// and returns (username, user_id, token).
async fn user_with_role(
    client: &reqwest::Client,
    address: &str,
    pool: &PgPool,
    role: &str,
) -> (String, i64, String) {
    let username = unique("u");
    let password = "password123";

    let resp = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let user_id: i64 =
        sqlx::query_scalar("UPDATE users SET role = $1 WHERE username = $2 RETURNING id")
            .bind(role)
            .bind(&username)
            .fetch_one(pool)
            .await
            .unwrap();

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let token = login["token"].as_str().unwrap().to_string();
    (username, user_id, token)
}

#[tokio::test]
async fn plain_admin_cannot_create_programs() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, _, admin_token) = user_with_role(&client, &address, &pool, "admin").await;
    let (_, _, super_token) = user_with_role(&client, &address, &pool, "super_admin").await;

    let body = serde_json::json!({
        "code": unique("prog"),
        "name": "Program",
        "price": 0,
        "duration_months": 3
    });

    let denied = client
        .post(format!("{}/api/admin/programs", address))
        .bearer_auth(&admin_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);

    let allowed = client
        .post(format!("{}/api/admin/programs", address))
        .bearer_auth(&super_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status().as_u16(), 201);
}

#[tokio::test]
async fn assigned_program_admin_can_edit_and_enroll() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_id, admin_token) = user_with_role(&client, &address, &pool, "admin").await;
    let (_, _, super_token) = user_with_role(&client, &address, &pool, "super_admin").await;
    let (_, student_id, _) = user_with_role(&client, &address, &pool, "user").await;

    let program: serde_json::Value = client
        .post(format!("{}/api/admin/programs", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "code": unique("prog"),
            "name": "Assigned Program",
            "price": 2500,
            "duration_months": 6
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let program_id = program["id"].as_i64().unwrap();

    // Unassigned: program edits and enrollment management are refused.
    let resp = client
        .put(format!("{}/api/admin/programs/{}", address, program_id))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "name": "Renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .post(format!("{}/api/admin/programs/{}/admins", address, program_id))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({ "user_id": admin_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // Assigned: the same admin may now edit the program...
    let resp = client
        .put(format!("{}/api/admin/programs/{}", address, program_id))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "name": "Renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // ...manually enroll a student into it...
    let resp = client
        .post(format!("{}/api/admin/enrollments/manual", address))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "user_id": student_id, "program_id": program_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // ...and list that program's enrollments.
    let resp = client
        .get(format!(
            "{}/api/admin/enrollments?program_id={}",
            address, program_id
        ))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let rows: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(rows.iter().any(|r| r["user_id"].as_i64() == Some(student_id)));
}

#[tokio::test]
async fn regular_user_cannot_reach_admin_console() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, _, user_token) = user_with_role(&client, &address, &pool, "user").await;

    let resp = client
        .get(format!("{}/api/admin/users", address))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // And without a token at all.
    let resp = client
        .get(format!("{}/api/admin/users", address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_cannot_touch_super_admin_accounts() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, _, admin_token) = user_with_role(&client, &address, &pool, "admin").await;
    let (_, super_id, _) = user_with_role(&client, &address, &pool, "super_admin").await;

    let resp = client
        .delete(format!("{}/api/admin/users/{}", address, super_id))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .put(format!("{}/api/admin/users/{}", address, super_id))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "is_premium": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn self_deletion_is_refused() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, super_id, super_token) = user_with_role(&client, &address, &pool, "super_admin").await;

    let resp = client
        .delete(format!("{}/api/admin/users/{}", address, super_id))
        .bearer_auth(&super_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn publish_snapshots_and_soft_delete_hides_from_listing() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, _, super_token) = user_with_role(&client, &address, &pool, "super_admin").await;

    let exam: serde_json::Value = client
        .post(format!("{}/api/admin/exams", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "title": unique("Open Mock"),
            "passing_marks": 1,
            "is_global": false
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let exam_id = exam["id"].as_i64().unwrap();
    assert_eq!(exam["status"].as_str().unwrap(), "draft");

    // Publishing an exam with no questions is refused.
    let empty = client
        .post(format!("{}/api/admin/exams/{}/publish", address, exam_id))
        .bearer_auth(&super_token)
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status().as_u16(), 400);

    let q = client
        .post(format!("{}/api/admin/questions", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "exam_id": exam_id,
            "content": "Pick A",
            "options": ["A", "B"],
            "correct_answer": "A",
            "marks": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(q.status().as_u16(), 201);

    let published = client
        .post(format!("{}/api/admin/exams/{}/publish", address, exam_id))
        .bearer_auth(&super_token)
        .send()
        .await
        .unwrap();
    assert_eq!(published.status().as_u16(), 200);

    // Publishing again produces version 2.
    let again = client
        .post(format!("{}/api/admin/exams/{}/publish", address, exam_id))
        .bearer_auth(&super_token)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 200);

    let versions: Vec<serde_json::Value> = client
        .get(format!("{}/api/admin/exams/{}/versions", address, exam_id))
        .bearer_auth(&super_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);

    // Visible in the public listing while live.
    let listed: Vec<serde_json::Value> = client
        .get(format!("{}/api/exams", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.iter().any(|e| e["id"].as_i64() == Some(exam_id)));

    // Soft delete.
    let deleted = client
        .delete(format!("{}/api/admin/exams/{}", address, exam_id))
        .bearer_auth(&super_token)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status().as_u16(), 204);

    // Gone from the listing, still fetchable by id, history intact.
    let listed: Vec<serde_json::Value> = client
        .get(format!("{}/api/exams", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!listed.iter().any(|e| e["id"].as_i64() == Some(exam_id)));

    let by_id = client
        .get(format!("{}/api/exams/{}", address, exam_id))
        .send()
        .await
        .unwrap();
    assert_eq!(by_id.status().as_u16(), 200);

    let versions: Vec<serde_json::Value> = client
        .get(format!("{}/api/admin/exams/{}/versions", address, exam_id))
        .bearer_auth(&super_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
}

#[tokio::test]
async fn automation_rules_match_by_trigger_and_conditions() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, _, super_token) = user_with_role(&client, &address, &pool, "super_admin").await;

    let bad_trigger = client
        .post(format!("{}/api/admin/automation/rules", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "name": unique("rule"),
            "trigger": "no_such_trigger",
            "subject": "s",
            "body": "b"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_trigger.status().as_u16(), 400);

    let rule_name = unique("welcome");
    let created = client
        .post(format!("{}/api/admin/automation/rules", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "name": rule_name,
            "trigger": "user_registration",
            "conditions": { "plan": "jee" },
            "subject": "Welcome",
            "body": "Hello there"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);
    let rule: serde_json::Value = created.json().await.unwrap();
    assert_eq!(rule["trigger"].as_str().unwrap(), "user_registration");
    let rule_id = rule["id"].as_i64().unwrap();

    // Matching payload fires the rule.
    let matched: Vec<serde_json::Value> = client
        .post(format!("{}/api/admin/automation/match", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "trigger": "user_registration",
            "payload": { "plan": "jee", "source": "web" }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(matched.iter().any(|r| r["id"].as_i64() == Some(rule_id)));

    // Value mismatch does not.
    let matched: Vec<serde_json::Value> = client
        .post(format!("{}/api/admin/automation/match", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "trigger": "user_registration",
            "payload": { "plan": "neet" }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!matched.iter().any(|r| r["id"].as_i64() == Some(rule_id)));

    // Deactivated rules never fire.
    let resp = client
        .put(format!("{}/api/admin/automation/rules/{}", address, rule_id))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let matched: Vec<serde_json::Value> = client
        .post(format!("{}/api/admin/automation/match", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "trigger": "user_registration",
            "payload": { "plan": "jee" }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!matched.iter().any(|r| r["id"].as_i64() == Some(rule_id)));
}

#[tokio::test]
async fn email_webhook_verifies_signature_and_dedupes() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let message_id = unique("msg");
    let body = serde_json::json!({
        "messageId": message_id,
        "from": "student@example.com",
        "subject": "Doubt about question 3",
        "body": "Could you explain the answer?"
    })
    .to_string();

    // No signature.
    let resp = client
        .post(format!("{}/api/webhooks/email-received", address))
        .header("Content-Type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    // Bad signature. Nothing is stored.
    let resp = client
        .post(format!("{}/api/webhooks/email-received", address))
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", "deadbeef")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM inbound_emails WHERE message_id = $1")
            .bind(&message_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 0);

    // Valid signature.
    let signature = sign_body(WEBHOOK_SECRET, body.as_bytes());
    let resp = client
        .post(format!("{}/api/webhooks/email-received", address))
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", signature.clone())
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // Replay of the same messageId is acknowledged without a second row.
    let resp = client
        .post(format!("{}/api/webhooks/email-received", address))
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", signature)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let ack: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(ack["message"].as_str().unwrap(), "already processed");

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM inbound_emails WHERE message_id = $1")
            .bind(&message_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn payment_enroll_and_approval_activates_enrollment() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, _, super_token) = user_with_role(&client, &address, &pool, "super_admin").await;
    let (_, student_id, student_token) = user_with_role(&client, &address, &pool, "user").await;

    let program: serde_json::Value = client
        .post(format!("{}/api/admin/programs", address))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({
            "code": unique("prog"),
            "name": "Paid Program",
            "price": 9900,
            "duration_months": 12
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let program_id = program["id"].as_i64().unwrap();

    let enroll = client
        .post(format!("{}/api/payments/enroll", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({ "program_ids": [program_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(enroll.status().as_u16(), 201);
    let receipt: serde_json::Value = enroll.json().await.unwrap();
    let payment_id = receipt["id"].as_i64().unwrap();
    assert_eq!(receipt["amount"].as_i64().unwrap(), 9900);

    // Pending until approved.
    let status: String = sqlx::query_scalar(
        "SELECT status FROM program_enrollments WHERE user_id = $1 AND program_id = $2",
    )
    .bind(student_id)
    .bind(program_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "pending_approval");

    let approve = client
        .put(format!("{}/api/admin/payments/{}/approval", address, payment_id))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({ "approval_status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(approve.status().as_u16(), 200);

    let (status, expires_at): (String, Option<chrono::DateTime<chrono::Utc>>) =
        sqlx::query_as(
            "SELECT status, expires_at FROM program_enrollments
             WHERE user_id = $1 AND program_id = $2",
        )
        .bind(student_id)
        .bind(program_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "active");
    assert!(expires_at.is_some());

    // Re-approving reports already processed and does not duplicate anything.
    let replay = client
        .put(format!("{}/api/admin/payments/{}/approval", address, payment_id))
        .bearer_auth(&super_token)
        .json(&serde_json::json!({ "approval_status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status().as_u16(), 200);
    let ack: serde_json::Value = replay.json().await.unwrap();
    assert_eq!(ack["message"].as_str().unwrap(), "already processed");
}
