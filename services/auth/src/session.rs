//! Session management on top of the key-value cache

use anyhow::Result;
use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, InvalidHeaderValue, USER_AGENT},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use exam_common::cache::CacheStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::{AuthConfig, MAX_TTL_SECONDS},
    models::Session,
    tokens::{generate_token, hash_token},
};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE_NAME: &str = "exam_session";

/// Client details recorded on new sessions
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let ip_address = header("x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .or_else(|| header("x-real-ip"))
            .map(str::to_string);

        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Session manager for handling user sessions in the cache
#[derive(Clone)]
pub struct SessionManager {
    cache: Arc<dyn CacheStore>,
    ttl_seconds: u64,
    update_age_seconds: u64,
    cookie_secure: bool,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(cache: Arc<dyn CacheStore>, config: &AuthConfig) -> Self {
        Self {
            cache,
            ttl_seconds: config.session_ttl_seconds.min(MAX_TTL_SECONDS),
            update_age_seconds: config.session_update_age_seconds.min(MAX_TTL_SECONDS),
            cookie_secure: config.cookie_secure,
        }
    }

    fn key(token: &str) -> String {
        format!("session:{}", hash_token(token))
    }

    /// Create a new session for a user, returning the raw token
    pub async fn create_session(&self, user_id: Uuid, meta: &RequestMeta) -> Result<(String, Session)> {
        info!("Creating session for user: {}", user_id);

        let token = generate_token()?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            expires_at: now + Duration::seconds(self.ttl_seconds as i64),
            created_at: now,
            updated_at: now,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        };

        self.store(&token, &session).await?;
        Ok((token, session))
    }

    /// Resolve a token into its live session
    ///
    /// A session last refreshed more than the update age ago gets a fresh
    /// expiry.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let key = Self::key(token);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        let mut session: Session = serde_json::from_str(&raw)?;

        let now = Utc::now();
        if session.is_expired(now) {
            self.cache.delete(&key).await?;
            return Ok(None);
        }

        if now - session.updated_at >= Duration::seconds(self.update_age_seconds as i64) {
            session.updated_at = now;
            session.expires_at = now + Duration::seconds(self.ttl_seconds as i64);
            self.store(token, &session).await?;
        }

        Ok(Some(session))
    }

    /// Delete a session
    pub async fn delete_session(&self, token: &str) -> Result<()> {
        self.cache.delete(&Self::key(token)).await
    }

    async fn store(&self, token: &str, session: &Session) -> Result<()> {
        let remaining = (session.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let value = serde_json::to_string(session)?;
        self.cache
            .set(&Self::key(token), &value, Some(remaining))
            .await
    }

    /// Build the `Set-Cookie` value carrying a session token
    pub fn session_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl_seconds
        );
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// Build the `Set-Cookie` value that removes the session cookie
    pub fn clear_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie =
            format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// Read the session token from the cookie, falling back to a bearer header
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        let value = cookie.value().trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}
