use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use exam_api::{config::ServerConfig, routes, state::AppState};
use exam_auth::{
    AuthConfig, AuthService,
    database::run_migrations,
    email::EmailConfig,
    oauth::{OAuthClient, OAuthConfig},
    repositories::PgUserRepository,
};
use exam_common::{
    cache::{CacheStore, RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("exam_api=info,exam_auth=info,tower_http=info")),
        )
        .init();

    info!("Starting API service");

    let server_config = ServerConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    run_migrations(&pool).await?;

    // Sessions and one-time tokens live in Redis
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;
    if redis_pool.health_check().await? {
        info!("Redis connection successful");
    } else {
        anyhow::bail!("Failed to connect to Redis");
    }

    let auth_config = AuthConfig::from_env()?;
    let google = OAuthConfig::google_from_env(&auth_config.base_url);
    let email_sender = EmailConfig::from_env().sender();

    let mut auth = AuthService::new(
        auth_config,
        Arc::new(PgUserRepository::new(pool)),
        Arc::new(redis_pool),
        email_sender,
    );

    match google {
        Some(google) => {
            let client = OAuthClient::new_google(google)?;
            info!("{} sign-in enabled", client.provider().as_str());
            auth = auth.with_google(client);
        }
        None => info!("Google sign-in disabled: GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set"),
    }

    info!("API service initialized successfully");

    // Start the web server
    let app = routes::create_router(AppState::new(auth));

    let addr = server_config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("API service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
