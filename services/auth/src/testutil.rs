//! Test utilities: in-memory doubles for the auth service's seams.
//!
//! Lets the service and routers run without Postgres, Redis or an email API.
//! All doubles use `Arc<Mutex<_>>` so tests can inspect what was recorded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use exam_common::{
    cache::MemoryCache,
    error::{DatabaseError, DatabaseResult},
};
use oauth2::url::Url;
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    email::{EmailMessage, EmailSender},
    models::{Account, NewAccount, NewUser, Role, UpdateUser, User},
    repositories::UserStore,
    service::AuthService,
};

// ---------------------------------------------------------------------------
// MemoryUserRepository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryUsers {
    users: HashMap<Uuid, User>,
    accounts: Vec<Account>,
}

/// [`UserStore`] backed by a `HashMap`, with the same uniqueness rules as the
/// Postgres schema.
#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    inner: Arc<Mutex<MemoryUsers>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, id: Uuid, apply: F) -> DatabaseResult<User>
    where
        F: FnOnce(&mut User),
    {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {id}")))?;
        apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserRepository {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::Conflict(format!(
                "email {} already registered",
                new_user.email
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            name: new_user.name.clone(),
            password_hash: new_user.password_hash.clone(),
            email_verified: new_user.email_verified,
            image: new_user.image.clone(),
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(&self, id: Uuid, update: &UpdateUser) -> DatabaseResult<User> {
        self.update(id, |user| {
            if let Some(name) = &update.name {
                user.name = name.clone();
            }
            if let Some(image) = &update.image {
                user.image = Some(image.clone());
            }
        })
    }

    async fn set_email_verified(&self, id: Uuid) -> DatabaseResult<User> {
        self.update(id, |user| user.email_verified = true)
    }

    async fn set_password(&self, id: Uuid, password_hash: Option<&str>) -> DatabaseResult<()> {
        self.update(id, |user| user.password_hash = password_hash.map(str::to_string))
            .map(|_| ())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> DatabaseResult<User> {
        self.update(id, |user| user.role = role)
    }

    async fn find_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> DatabaseResult<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .accounts
            .iter()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .and_then(|a| inner.users.get(&a.user_id).cloned()))
    }

    async fn link_account(&self, new_account: &NewAccount) -> DatabaseResult<Account> {
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.iter().any(|a| {
            a.provider == new_account.provider
                && a.provider_account_id == new_account.provider_account_id
        }) {
            return Err(DatabaseError::Conflict(format!(
                "{} account already linked",
                new_account.provider
            )));
        }

        let account = Account {
            id: Uuid::new_v4(),
            user_id: new_account.user_id,
            provider: new_account.provider.clone(),
            provider_account_id: new_account.provider_account_id.clone(),
            created_at: Utc::now(),
        };
        inner.accounts.push(account.clone());
        Ok(account)
    }
}

// ---------------------------------------------------------------------------
// RecordingEmailSender
// ---------------------------------------------------------------------------

/// Email sender that keeps every message instead of delivering it.
#[derive(Clone, Default)]
pub struct RecordingEmailSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Most recent message addressed to `email`
    pub fn last_to(&self, email: &str) -> Option<EmailMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.to == email)
            .cloned()
    }

    /// Token carried by the most recent link sent to `email`
    ///
    /// Handles both `?token=` links and `/reset-password/{token}` paths.
    pub fn token_for(&self, email: &str) -> Option<String> {
        let message = self.last_to(email)?;
        let url = Url::parse(&message.action_url).ok()?;

        if let Some((_, token)) = url.query_pairs().find(|(key, _)| key == "token") {
            return Some(token.into_owned());
        }

        let mut segments = url.path_segments()?;
        segments.find(|s| *s == "reset-password")?;
        segments.next().map(str::to_string)
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// An [`AuthService`] wired to in-memory doubles, plus handles to them.
#[derive(Clone)]
pub struct TestAuth {
    pub service: AuthService,
    pub users: Arc<MemoryUserRepository>,
    pub cache: MemoryCache,
    pub emails: RecordingEmailSender,
}

pub fn test_auth() -> TestAuth {
    test_auth_with(AuthConfig::default())
}

pub fn test_auth_with(config: AuthConfig) -> TestAuth {
    let users = Arc::new(MemoryUserRepository::new());
    let cache = MemoryCache::new();
    let emails = RecordingEmailSender::new();

    let service = AuthService::new(
        config,
        users.clone(),
        Arc::new(cache.clone()),
        Arc::new(emails.clone()),
    );

    TestAuth {
        service,
        users,
        cache,
        emails,
    }
}
