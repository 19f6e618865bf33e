//! One-time tokens for email verification and password reset

use anyhow::Result;
use chrono::{DateTime, Utc};
use exam_common::cache::CacheStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::User,
    tokens::{generate_token, hash_token},
};

/// What a one-time token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email-verification",
            TokenPurpose::PasswordReset => "password-reset",
        }
    }
}

/// Stored payload of a one-time token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub user_id: Uuid,
    pub email: String,
    pub purpose: TokenPurpose,
    pub created_at: DateTime<Utc>,
}

/// Issues and redeems single-use tokens
#[derive(Clone)]
pub struct VerificationManager {
    cache: Arc<dyn CacheStore>,
    ttl_seconds: u64,
}

impl VerificationManager {
    pub fn new(cache: Arc<dyn CacheStore>, ttl_seconds: u64) -> Self {
        Self { cache, ttl_seconds }
    }

    fn key(purpose: TokenPurpose, token: &str) -> String {
        format!("verification:{}:{}", purpose.as_str(), hash_token(token))
    }

    /// Issue a token for `user`, returning the raw value to embed in a link
    pub async fn issue(&self, purpose: TokenPurpose, user: &User) -> Result<String> {
        let token = generate_token()?;
        let record = VerificationRecord {
            user_id: user.id,
            email: user.email.clone(),
            purpose,
            created_at: Utc::now(),
        };

        self.cache
            .set(
                &Self::key(purpose, &token),
                &serde_json::to_string(&record)?,
                Some(self.ttl_seconds),
            )
            .await?;
        Ok(token)
    }

    /// Look a token up without redeeming it
    pub async fn peek(&self, purpose: TokenPurpose, token: &str) -> Result<Option<VerificationRecord>> {
        match self.cache.get(&Self::key(purpose, token)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Redeem a token; a second call with the same token yields `None`
    pub async fn consume(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<VerificationRecord>> {
        match self.cache.take(&Self::key(purpose, token)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
