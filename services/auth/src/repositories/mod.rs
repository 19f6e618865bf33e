//! Credential store access
//!
//! [`UserStore`] is everything the auth service needs from persistence.
//! [`PgUserRepository`] maps it onto the `users`/`accounts` tables.

use async_trait::async_trait;
use exam_common::error::DatabaseResult;
use uuid::Uuid;

use crate::models::{Account, NewAccount, NewUser, Role, UpdateUser, User};

pub mod user;

pub use user::PgUserRepository;

/// Persistence operations on users and their linked accounts
///
/// Emails are looked up exactly as given; callers normalize them first.
/// Mutations on a missing user return `DatabaseError::NotFound`, inserts that
/// collide with an existing email or provider identity return
/// `DatabaseError::Conflict`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    async fn update_profile(&self, id: Uuid, update: &UpdateUser) -> DatabaseResult<User>;

    async fn set_email_verified(&self, id: Uuid) -> DatabaseResult<User>;

    /// Replace the password hash; `None` removes password sign-in
    async fn set_password(&self, id: Uuid, password_hash: Option<&str>) -> DatabaseResult<()>;

    async fn set_role(&self, id: Uuid, role: Role) -> DatabaseResult<User>;

    /// Find the user linked to a provider identity
    async fn find_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> DatabaseResult<Option<User>>;

    async fn link_account(&self, new_account: &NewAccount) -> DatabaseResult<Account>;
}
