//! User repository for database operations

use async_trait::async_trait;
use exam_common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::UserStore;
use crate::models::{Account, NewAccount, NewUser, Role, UpdateUser, User};

const USER_COLUMNS: &str =
    "id, email, name, password_hash, email_verified, image, role, created_at, updated_at";

/// PostgreSQL-backed user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(e: sqlx::Error) -> DatabaseError {
    DatabaseError::Decode(e.to_string())
}

fn user_from_row(row: &PgRow) -> DatabaseResult<User> {
    let role: String = row.try_get("role").map_err(decode)?;
    let role = role.parse::<Role>().map_err(DatabaseError::Decode)?;

    Ok(User {
        id: row.try_get("id").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        email_verified: row.try_get("email_verified").map_err(decode)?,
        image: row.try_get("image").map_err(decode)?,
        role,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn found(row: Option<PgRow>, id: Uuid) -> DatabaseResult<User> {
    match row {
        Some(row) => user_from_row(&row),
        None => Err(DatabaseError::NotFound(format!("user {id}"))),
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        info!("Creating new user: {}", new_user.email);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (email, name, password_hash, email_verified, image, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.password_hash)
        .bind(new_user.email_verified)
        .bind(&new_user.image)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        user_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_profile(&self, id: Uuid, update: &UpdateUser) -> DatabaseResult<User> {
        info!("Updating profile for user: {}", id);

        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                image = COALESCE($3, image),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.image)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        found(row, id)
    }

    async fn set_email_verified(&self, id: Uuid) -> DatabaseResult<User> {
        info!("Marking email verified for user: {}", id);

        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET email_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        found(row, id)
    }

    async fn set_password(&self, id: Uuid, password_hash: Option<&str>) -> DatabaseResult<()> {
        info!("Updating password for user: {}", id);

        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> DatabaseResult<User> {
        info!("Setting role {} for user: {}", role, id);

        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        found(row, id)
    }

    async fn find_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.email, u.name, u.password_hash, u.email_verified, u.image,
                   u.role, u.created_at, u.updated_at
            FROM users u
            JOIN accounts a ON a.user_id = u.id
            WHERE a.provider = $1 AND a.provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn link_account(&self, new_account: &NewAccount) -> DatabaseResult<Account> {
        info!(
            "Linking {} account to user: {}",
            new_account.provider, new_account.user_id
        );

        let row = sqlx::query(
            r#"
            INSERT INTO accounts (user_id, provider, provider_account_id)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, provider, provider_account_id, created_at
            "#,
        )
        .bind(new_account.user_id)
        .bind(&new_account.provider)
        .bind(&new_account.provider_account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(Account {
            id: row.try_get("id").map_err(decode)?,
            user_id: row.try_get("user_id").map_err(decode)?,
            provider: row.try_get("provider").map_err(decode)?,
            provider_account_id: row.try_get("provider_account_id").map_err(decode)?,
            created_at: row.try_get("created_at").map_err(decode)?,
        })
    }
}
