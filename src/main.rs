// src/main.rs

use dotenvy::dotenv;
use oprep_backend::config::Config;
use oprep_backend::routes;
use oprep_backend::state::AppState;
use oprep_backend::utils::hash::hash_password;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Database pool with startup retry; the container may come up before Postgres.
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_super_admin(&pool, &config).await {
        tracing::error!("Failed to seed super admin: {:?}", e);
    }

    let port = config.port;
    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("O'Prep listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    axum::serve(listener, app).await.unwrap();
}

async fn seed_super_admin(
    pool: &PgPool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(pool)
                .await?;

        if exists.is_none() {
            tracing::info!("Seeding super admin: {}", username);
            let hashed_password = hash_password(password)?;

            sqlx::query("INSERT INTO users (username, password, role) VALUES ($1, $2, 'super_admin')")
                .bind(username)
                .bind(hashed_password)
                .execute(pool)
                .await?;
            tracing::info!("Super admin created successfully.");
        }
    }
    Ok(())
}
