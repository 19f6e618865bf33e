//! Schema management for the credential store

use exam_common::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tracing::info;

/// Apply the embedded migrations (`users`, `accounts`)
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    info!("Running credential store migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    info!("Credential store migrations applied");
    Ok(())
}
