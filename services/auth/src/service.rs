//! Auth service: sign-up, sign-in, sessions, verification and password reset
//!
//! Handlers in [`crate::routes`] stay thin; every rule about who may do what
//! lives here so it can be exercised without HTTP.

use anyhow::anyhow;
use axum::http::{HeaderMap, HeaderValue};
use exam_common::{cache::CacheStore, error::DatabaseError};
use oauth2::{PkceCodeVerifier, url::Url};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    email::{self, EmailSender},
    error::{AuthError, AuthResult},
    models::{
        NewAccount, NewUser, Role, Session, UpdateUser, User,
        requests::{
            OAuthCallbackQuery, ResetPasswordRequest, SignInEmailRequest, SignUpEmailRequest,
            UpdateUserRequest,
        },
    },
    oauth::{OAuthClient, OAuthProvider, OAuthSession, OAuthStateStore, OAuthUserProfile},
    password::{hash_password, verify_password},
    rate_limiter::RateLimiter,
    repositories::UserStore,
    routes::AUTH_BASE_PATH,
    session::{RequestMeta, SessionManager, extract_session_token},
    validation::{
        is_trusted_redirect, normalize_email, validate_email, validate_name, validate_password,
        validate_password_confirmation,
    },
    verification::{TokenPurpose, VerificationManager},
};

/// A freshly issued session and the raw token for its cookie
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub session: Session,
}

#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: User,
    /// `None` when email verification must happen first
    pub session: Option<AuthSession>,
}

#[derive(Debug, Clone)]
pub struct SignInOutcome {
    pub user: User,
    pub session: AuthSession,
    /// Trusted callback the caller asked for, already trimmed
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SocialCallbackOutcome {
    pub sign_in: SignInOutcome,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct VerifyEmailOutcome {
    pub user: User,
    pub session: Option<AuthSession>,
}

/// Orchestrates credential, session and token state
#[derive(Clone)]
pub struct AuthService {
    config: Arc<AuthConfig>,
    users: Arc<dyn UserStore>,
    sessions: SessionManager,
    verifications: VerificationManager,
    oauth_states: OAuthStateStore,
    email: Arc<dyn EmailSender>,
    google: Option<OAuthClient>,
    rate_limiter: RateLimiter,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        cache: Arc<dyn CacheStore>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        let sessions = SessionManager::new(cache.clone(), &config);
        let verifications =
            VerificationManager::new(cache.clone(), config.verification_ttl_seconds);
        let oauth_states = OAuthStateStore::new(cache);

        Self {
            config: Arc::new(config),
            users,
            sessions,
            verifications,
            oauth_states,
            email,
            google: None,
            rate_limiter: RateLimiter::default(),
        }
    }

    /// Enable Google sign-in
    pub fn with_google(mut self, client: OAuthClient) -> Self {
        self.google = Some(client);
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Accept a redirect target only when it stays on a trusted origin
    ///
    /// `None` resolves to the configured default redirect.
    pub fn resolve_redirect(&self, target: Option<&str>) -> AuthResult<String> {
        match target.map(str::trim).filter(|t| !t.is_empty()) {
            None => Ok(self.config.default_redirect().to_string()),
            Some(target) if is_trusted_redirect(target, &self.config.trusted_origins) => {
                Ok(target.to_string())
            }
            Some(target) => {
                warn!("Rejected untrusted redirect target: {}", target);
                Err(AuthError::UntrustedRedirect)
            }
        }
    }

    pub fn session_cookie(&self, token: &str) -> AuthResult<HeaderValue> {
        self.sessions
            .session_cookie(token)
            .map_err(|e| AuthError::Internal(anyhow!("invalid session cookie: {e}")))
    }

    pub fn clear_session_cookie(&self) -> AuthResult<HeaderValue> {
        self.sessions
            .clear_cookie()
            .map_err(|e| AuthError::Internal(anyhow!("invalid session cookie: {e}")))
    }

    /// Register a user with email and password
    pub async fn sign_up_email(
        &self,
        request: &SignUpEmailRequest,
        meta: &RequestMeta,
    ) -> AuthResult<SignUpOutcome> {
        let email = normalize_email(&request.email);
        validate_email(&email).map_err(AuthError::Validation)?;
        validate_password(&request.password).map_err(AuthError::Validation)?;
        validate_name(&request.name).map_err(AuthError::Validation)?;
        let callback = match request.callback_url.as_deref() {
            Some(target) => Some(self.resolve_redirect(Some(target))?),
            None => None,
        };

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let role = if self.config.is_admin_email(&email) {
            Role::Admin
        } else {
            Role::User
        };
        let new_user = NewUser {
            email,
            name: request.name.trim().to_string(),
            password_hash: Some(hash_password(&request.password)?),
            email_verified: false,
            image: request.image.clone(),
            role,
        };

        let user = self.users.create(&new_user).await.map_err(|e| match e {
            DatabaseError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Database(other),
        })?;
        info!("User signed up: {}", user.id);

        if self.config.send_verification_on_sign_up || self.config.require_email_verification {
            self.deliver_verification(&user, callback.as_deref()).await;
        }

        let session = if self.config.require_email_verification {
            None
        } else {
            Some(self.start_session(&user, meta).await?)
        };

        Ok(SignUpOutcome { user, session })
    }

    /// Sign in with email and password
    pub async fn sign_in_email(
        &self,
        request: &SignInEmailRequest,
        meta: &RequestMeta,
    ) -> AuthResult<SignInOutcome> {
        let email = normalize_email(&request.email);
        validate_email(&email).map_err(AuthError::Validation)?;
        let callback = match request.callback_url.as_deref() {
            Some(target) => Some(self.resolve_redirect(Some(target))?),
            None => None,
        };

        // keyed per client so failures from one address cannot lock out another
        let limiter_key = format!(
            "sign-in:{}:{email}",
            meta.ip_address.as_deref().unwrap_or("unknown")
        );
        if !self.rate_limiter.is_allowed(&limiter_key).await {
            warn!("Sign-in rate limited for {}", email);
            return Err(AuthError::RateLimited);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let Some(password_hash) = user.password_hash.as_deref() else {
            warn!("Password sign-in attempted for social-only user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&request.password, password_hash)? {
            warn!("Failed sign-in for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        if self.config.require_email_verification && !user.email_verified {
            self.deliver_verification(&user, callback.as_deref()).await;
            return Err(AuthError::EmailNotVerified);
        }

        self.rate_limiter.reset(&limiter_key).await;
        let session = self.start_session(&user, meta).await?;
        info!("User signed in: {}", user.id);

        Ok(SignInOutcome {
            user,
            session,
            callback_url: callback,
        })
    }

    /// Drop the session behind `token`, if any
    pub async fn sign_out(&self, token: Option<&str>) -> AuthResult<()> {
        if let Some(token) = token {
            self.sessions.delete_session(token).await?;
            info!("Session signed out");
        }
        Ok(())
    }

    /// Resolve the session carried by request headers
    pub async fn current_session(&self, headers: &HeaderMap) -> AuthResult<Option<(Session, User)>> {
        let Some(token) = extract_session_token(headers) else {
            return Ok(None);
        };
        self.session_for_token(&token).await
    }

    pub async fn session_for_token(&self, token: &str) -> AuthResult<Option<(Session, User)>> {
        let Some(session) = self.sessions.get_session(token).await? else {
            return Ok(None);
        };

        match self.users.find_by_id(session.user_id).await? {
            Some(user) => Ok(Some((session, user))),
            None => {
                warn!("Dropping session of missing user {}", session.user_id);
                self.sessions.delete_session(token).await?;
                Ok(None)
            }
        }
    }

    /// Send a verification email when the address belongs to an unverified user
    ///
    /// Succeeds either way so callers cannot learn which emails exist.
    pub async fn send_verification_email(
        &self,
        email: &str,
        callback_url: Option<&str>,
    ) -> AuthResult<()> {
        let email = normalize_email(email);
        validate_email(&email).map_err(AuthError::Validation)?;
        let callback = match callback_url {
            Some(target) => Some(self.resolve_redirect(Some(target))?),
            None => None,
        };

        if !self
            .rate_limiter
            .is_allowed(&format!("send-verification:{email}"))
            .await
        {
            return Err(AuthError::RateLimited);
        }

        match self.users.find_by_email(&email).await? {
            Some(user) if !user.email_verified => {
                self.deliver_verification(&user, callback.as_deref()).await;
            }
            Some(_) => info!("Verification requested for already verified email"),
            None => info!("Verification requested for unknown email"),
        }
        Ok(())
    }

    /// Redeem an email-verification token
    pub async fn verify_email(&self, token: &str, meta: &RequestMeta) -> AuthResult<VerifyEmailOutcome> {
        let record = self
            .verifications
            .consume(TokenPurpose::EmailVerification, token.trim())
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        // the address changed since the link was sent
        if user.email != record.email {
            return Err(AuthError::InvalidToken);
        }

        let user = if user.email_verified {
            user
        } else {
            let user = self.users.set_email_verified(user.id).await?;
            info!("Email verified for user {}", user.id);
            user
        };

        let session = if self.config.auto_sign_in_after_verification {
            Some(self.start_session(&user, meta).await?)
        } else {
            None
        };

        Ok(VerifyEmailOutcome { user, session })
    }

    /// Email a password-reset link; succeeds whether or not the user exists
    pub async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> AuthResult<()> {
        let email = normalize_email(email);
        validate_email(&email).map_err(AuthError::Validation)?;
        let redirect = self.resolve_redirect(redirect_to)?;

        if !self
            .rate_limiter
            .is_allowed(&format!("forget-password:{email}"))
            .await
        {
            return Err(AuthError::RateLimited);
        }

        match self.users.find_by_email(&email).await? {
            Some(user) => self.deliver_reset(&user, &redirect).await,
            None => info!("Password reset requested for unknown email"),
        }
        Ok(())
    }

    /// Where to send the browser that followed a reset link
    pub async fn reset_password_link(
        &self,
        token: &str,
        callback_url: Option<&str>,
    ) -> AuthResult<String> {
        let callback = self.resolve_redirect(callback_url)?;
        let live = self
            .verifications
            .peek(TokenPurpose::PasswordReset, token)
            .await?
            .is_some();

        Ok(if live {
            with_query_param(&callback, "token", token)
        } else {
            with_query_param(&callback, "error", AuthError::InvalidToken.code())
        })
    }

    /// Set a new password using a reset token
    ///
    /// The password is checked before the token is touched, so a rejected
    /// password leaves the token usable.
    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> AuthResult<()> {
        validate_password_confirmation(&request.new_password, request.confirm_password.as_deref())
            .map_err(AuthError::Validation)?;

        let token = request.token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let record = self
            .verifications
            .consume(TokenPurpose::PasswordReset, token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let password_hash = hash_password(&request.new_password)?;
        self.users.set_password(user.id, Some(&password_hash)).await?;
        info!("Password reset for user {}", user.id);

        Ok(())
    }

    pub async fn update_user(&self, user: &User, request: &UpdateUserRequest) -> AuthResult<User> {
        let name = match request.name.as_deref() {
            Some(name) => {
                validate_name(name).map_err(AuthError::Validation)?;
                Some(name.trim().to_string())
            }
            None => None,
        };
        let update = UpdateUser {
            name,
            image: request.image.clone(),
        };
        if update.is_empty() {
            return Err(AuthError::Validation("No fields to update".to_string()));
        }

        self.users
            .update_profile(user.id, &update)
            .await
            .map_err(not_found_as_user)
    }

    /// Change another user's role; only admins may do this
    pub async fn set_role(&self, actor: &User, target: Uuid, role: Role) -> AuthResult<User> {
        if !actor.role.is_admin() {
            warn!("User {} attempted to change a role without ADMIN", actor.id);
            return Err(AuthError::Forbidden);
        }

        let user = self
            .users
            .set_role(target, role)
            .await
            .map_err(not_found_as_user)?;
        info!("User {} set role {} on user {}", actor.id, role, target);
        Ok(user)
    }

    /// Start a social sign-in, returning the provider consent URL
    pub async fn social_sign_in_url(
        &self,
        provider: &str,
        callback_url: Option<&str>,
    ) -> AuthResult<String> {
        let provider: OAuthProvider = provider.parse().map_err(AuthError::ProviderNotFound)?;
        let callback = self.resolve_redirect(callback_url)?;
        let client = self.oauth_client(provider)?;

        let (url, csrf_token, pkce_verifier) = client.generate_auth_url();
        let pending = OAuthSession::new(pkce_verifier.secret().clone(), provider, callback);
        self.oauth_states.save(csrf_token.secret(), &pending).await?;

        Ok(url)
    }

    /// Finish a social sign-in from the provider's callback
    pub async fn complete_social_sign_in(
        &self,
        provider: &str,
        query: &OAuthCallbackQuery,
        meta: &RequestMeta,
    ) -> AuthResult<SocialCallbackOutcome> {
        let provider: OAuthProvider = provider.parse().map_err(AuthError::ProviderNotFound)?;
        if let Some(error) = &query.error {
            return Err(AuthError::OAuth(format!("provider returned {error}")));
        }
        let state = query
            .state
            .as_deref()
            .ok_or_else(|| AuthError::OAuth("missing state".to_string()))?;
        let code = query
            .code
            .clone()
            .ok_or_else(|| AuthError::OAuth("missing code".to_string()))?;

        let pending = self
            .oauth_states
            .take(state)
            .await?
            .ok_or_else(|| AuthError::OAuth("unknown or expired state".to_string()))?;
        if pending.provider != provider {
            return Err(AuthError::OAuth("provider mismatch".to_string()));
        }

        let client = self.oauth_client(provider)?;
        let access_token = client
            .exchange_code(code, PkceCodeVerifier::new(pending.pkce_verifier))
            .await
            .map_err(|e| {
                warn!("OAuth code exchange failed: {:#}", e);
                AuthError::OAuth("code exchange failed".to_string())
            })?;
        let profile = client.get_user_profile(&access_token).await.map_err(|e| {
            warn!("OAuth profile fetch failed: {:#}", e);
            AuthError::OAuth("profile fetch failed".to_string())
        })?;

        let sign_in = self.sign_in_with_profile(&profile, meta).await?;
        Ok(SocialCallbackOutcome {
            sign_in,
            callback_url: pending.callback_url,
        })
    }

    /// Find or create the user behind a provider profile and start a session
    pub async fn sign_in_with_profile(
        &self,
        profile: &OAuthUserProfile,
        meta: &RequestMeta,
    ) -> AuthResult<SignInOutcome> {
        let provider = profile.provider.as_str();
        let email = normalize_email(&profile.email);
        validate_email(&email)
            .map_err(|_| AuthError::OAuth("provider returned an invalid email".to_string()))?;

        let user = match self.users.find_by_account(provider, &profile.id).await? {
            Some(user) => user,
            None => {
                let user = match self.users.find_by_email(&email).await? {
                    Some(existing) => {
                        // linking on an unverified provider email would hand over the account
                        if !profile.verified_email {
                            return Err(AuthError::OAuth(
                                "email not verified by provider".to_string(),
                            ));
                        }
                        if existing.email_verified {
                            existing
                        } else {
                            // whoever set the password never proved they own the address
                            if existing.password_hash.is_some() {
                                self.users.set_password(existing.id, None).await?;
                                info!(
                                    "Cleared unverified password of user {} on {} link",
                                    existing.id, provider
                                );
                            }
                            self.users.set_email_verified(existing.id).await?
                        }
                    }
                    None => {
                        let name = profile
                            .name
                            .clone()
                            .filter(|name| !name.trim().is_empty())
                            .unwrap_or_else(|| {
                                email.split('@').next().unwrap_or_default().to_string()
                            });
                        let role = if self.config.is_admin_email(&email) {
                            Role::Admin
                        } else {
                            Role::User
                        };
                        let user = self
                            .users
                            .create(&NewUser {
                                email,
                                name,
                                password_hash: None,
                                email_verified: profile.verified_email,
                                image: profile.image.clone(),
                                role,
                            })
                            .await?;
                        info!("User signed up via {}: {}", provider, user.id);
                        user
                    }
                };

                self.users
                    .link_account(&NewAccount {
                        user_id: user.id,
                        provider: provider.to_string(),
                        provider_account_id: profile.id.clone(),
                    })
                    .await?;
                user
            }
        };

        let session = self.start_session(&user, meta).await?;
        info!("User signed in via {}: {}", provider, user.id);
        Ok(SignInOutcome {
            user,
            session,
            callback_url: None,
        })
    }

    fn oauth_client(&self, provider: OAuthProvider) -> AuthResult<&OAuthClient> {
        match provider {
            OAuthProvider::Google => self
                .google
                .as_ref()
                .ok_or_else(|| AuthError::ProviderNotFound(provider.as_str().to_string())),
        }
    }

    async fn start_session(&self, user: &User, meta: &RequestMeta) -> AuthResult<AuthSession> {
        let (token, session) = self.sessions.create_session(user.id, meta).await?;
        Ok(AuthSession { token, session })
    }

    /// Email a verification link; failures are logged, not returned
    async fn deliver_verification(&self, user: &User, callback_url: Option<&str>) {
        if let Err(e) = self.send_verification_link(user, callback_url).await {
            error!("Failed to send verification email to user {}: {:#}", user.id, e);
        }
    }

    async fn send_verification_link(
        &self,
        user: &User,
        callback_url: Option<&str>,
    ) -> anyhow::Result<()> {
        let token = self
            .verifications
            .issue(TokenPurpose::EmailVerification, user)
            .await?;
        let endpoint = format!("{}{}/verify-email", self.config.base_url, AUTH_BASE_PATH);
        let mut params = vec![("token", token.as_str())];
        if let Some(callback) = callback_url {
            params.push(("callbackURL", callback));
        }
        let url = Url::parse_with_params(&endpoint, &params)?;

        self.email
            .send(&email::verification_email(user, url.as_str()))
            .await
    }

    /// Email a password-reset link; failures are logged, not returned
    async fn deliver_reset(&self, user: &User, redirect: &str) {
        if let Err(e) = self.send_reset_link(user, redirect).await {
            error!("Failed to send reset email to user {}: {:#}", user.id, e);
        }
    }

    async fn send_reset_link(&self, user: &User, redirect: &str) -> anyhow::Result<()> {
        let token = self
            .verifications
            .issue(TokenPurpose::PasswordReset, user)
            .await?;
        let endpoint = format!(
            "{}{}/reset-password/{}",
            self.config.base_url, AUTH_BASE_PATH, token
        );
        let url = Url::parse_with_params(&endpoint, &[("callbackURL", redirect)])?;

        self.email
            .send(&email::reset_password_email(user, url.as_str()))
            .await
    }
}

fn not_found_as_user(e: DatabaseError) -> AuthError {
    match e {
        DatabaseError::NotFound(_) => AuthError::UserNotFound,
        other => AuthError::Database(other),
    }
}

/// Append `key=value` to a redirect target, absolute or relative
pub fn with_query_param(target: &str, key: &str, value: &str) -> String {
    let encoded: String = oauth2::url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish();
    let (base, fragment) = match target.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (target, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    match fragment {
        Some(fragment) => format!("{base}{separator}{encoded}#{fragment}"),
        None => format!("{base}{separator}{encoded}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::requests::SignUpEmailRequest,
        testutil::{TestAuth, test_auth, test_auth_with},
    };

    fn sign_up_request(email: &str, password: &str) -> SignUpEmailRequest {
        SignUpEmailRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: "Selam".to_string(),
            image: None,
            callback_url: None,
        }
    }

    fn sign_in_request(email: &str, password: &str) -> SignInEmailRequest {
        SignInEmailRequest {
            email: email.to_string(),
            password: password.to_string(),
            callback_url: None,
        }
    }

    async fn signed_up(auth: &TestAuth, email: &str) -> User {
        auth.service
            .sign_up_email(&sign_up_request(email, "secret123"), &RequestMeta::default())
            .await
            .unwrap()
            .user
    }

    #[test]
    fn query_params_are_appended() {
        assert_eq!(
            with_query_param("http://localhost:5173/reset", "token", "abc"),
            "http://localhost:5173/reset?token=abc"
        );
        assert_eq!(
            with_query_param("/reset?step=2", "error", "INVALID_TOKEN"),
            "/reset?step=2&error=INVALID_TOKEN"
        );
        assert_eq!(with_query_param("/app#top", "a", "b c"), "/app?a=b+c#top");
    }

    #[tokio::test]
    async fn sign_up_normalizes_email_and_starts_session() {
        let auth = test_auth();
        let outcome = auth
            .service
            .sign_up_email(
                &sign_up_request("  Selam@Example.com ", "secret123"),
                &RequestMeta::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.user.email, "selam@example.com");
        assert_eq!(outcome.user.role, Role::User);
        assert!(!outcome.user.email_verified);
        let session = outcome.session.expect("session created");

        let (found, user) = auth
            .service
            .session_for_token(&session.token)
            .await
            .unwrap()
            .expect("session resolves");
        assert_eq!(found.user_id, outcome.user.id);
        assert_eq!(user.email, "selam@example.com");
        assert_eq!(auth.emails.sent().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_rejected() {
        let auth = test_auth();
        signed_up(&auth, "dup@example.com").await;

        let err = auth
            .service
            .sign_up_email(
                &sign_up_request("DUP@example.com", "another123"),
                &RequestMeta::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn sign_up_validates_before_storing() {
        let auth = test_auth();

        let err = auth
            .service
            .sign_up_email(&sign_up_request("x@example.com", "123"), &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(auth.users.find_by_email("x@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn admin_emails_get_admin_role() {
        let auth = test_auth_with(AuthConfig {
            admin_emails: vec!["boss@example.com".to_string()],
            ..AuthConfig::default()
        });

        let user = signed_up(&auth, "Boss@Example.com").await;
        assert_eq!(user.role, Role::Admin);
    }

    #[tokio::test]
    async fn sign_in_checks_password() {
        let auth = test_auth();
        signed_up(&auth, "reader@example.com").await;

        let err = auth
            .service
            .sign_in_email(
                &sign_in_request("reader@example.com", "wrong-password"),
                &RequestMeta::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = auth
            .service
            .sign_in_email(
                &sign_in_request("nobody@example.com", "secret123"),
                &RequestMeta::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let outcome = auth
            .service
            .sign_in_email(
                &sign_in_request("reader@example.com", "secret123"),
                &RequestMeta::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.user.email, "reader@example.com");
    }

    #[tokio::test]
    async fn repeated_failures_are_rate_limited() {
        let auth = test_auth();
        signed_up(&auth, "target@example.com").await;
        let from = |ip: &str| RequestMeta {
            ip_address: Some(ip.to_string()),
            user_agent: None,
        };

        for _ in 0..5 {
            let _ = auth
                .service
                .sign_in_email(&sign_in_request("target@example.com", "guess"), &from("6.6.6.6"))
                .await;
        }

        let err = auth
            .service
            .sign_in_email(
                &sign_in_request("target@example.com", "secret123"),
                &from("6.6.6.6"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited));

        // the owner signing in from elsewhere is unaffected
        let outcome = auth
            .service
            .sign_in_email(
                &sign_in_request("target@example.com", "secret123"),
                &from("1.1.1.1"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.user.email, "target@example.com");
    }

    #[tokio::test]
    async fn custom_rate_limiter_applies() {
        let mut auth = test_auth();
        auth.service = auth
            .service
            .clone()
            .with_rate_limiter(RateLimiter::new(crate::rate_limiter::RateLimiterConfig {
                max_attempts: 1,
                window_seconds: 60,
                ban_duration_seconds: 60,
            }));
        signed_up(&auth, "strict@example.com").await;

        let request = sign_in_request("strict@example.com", "wrong");
        let first = auth
            .service
            .sign_in_email(&request, &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(first, AuthError::InvalidCredentials));

        let second = auth
            .service
            .sign_in_email(&request, &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(second, AuthError::RateLimited));
    }

    #[tokio::test]
    async fn verification_required_blocks_sign_in_until_verified() {
        let auth = test_auth_with(AuthConfig {
            require_email_verification: true,
            auto_sign_in_after_verification: false,
            ..AuthConfig::default()
        });

        let outcome = auth
            .service
            .sign_up_email(
                &sign_up_request("new@example.com", "secret123"),
                &RequestMeta::default(),
            )
            .await
            .unwrap();
        assert!(outcome.session.is_none());

        let err = auth
            .service
            .sign_in_email(
                &sign_in_request("new@example.com", "secret123"),
                &RequestMeta::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailNotVerified));

        let token = auth
            .emails
            .token_for("new@example.com")
            .expect("verification email sent");
        let verified = auth
            .service
            .verify_email(&token, &RequestMeta::default())
            .await
            .unwrap();
        assert!(verified.user.email_verified);
        assert!(verified.session.is_none());

        assert!(
            auth.service
                .sign_in_email(
                    &sign_in_request("new@example.com", "secret123"),
                    &RequestMeta::default(),
                )
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let auth = test_auth();
        signed_up(&auth, "once@example.com").await;
        let token = auth.emails.token_for("once@example.com").unwrap();

        let outcome = auth
            .service
            .verify_email(&token, &RequestMeta::default())
            .await
            .unwrap();
        assert!(outcome.session.is_some());

        let err = auth
            .service
            .verify_email(&token, &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let auth = test_auth();
        signed_up(&auth, "forgetful@example.com").await;

        auth.service
            .request_password_reset("forgetful@example.com", Some("/reset"))
            .await
            .unwrap();
        let token = auth.emails.token_for("forgetful@example.com").unwrap();

        let location = auth
            .service
            .reset_password_link(&token, Some("/reset"))
            .await
            .unwrap();
        assert_eq!(location, format!("/reset?token={token}"));

        auth.service
            .reset_password(&ResetPasswordRequest {
                new_password: "brand-new-pass".to_string(),
                token: token.clone(),
                confirm_password: Some("brand-new-pass".to_string()),
            })
            .await
            .unwrap();

        assert!(
            auth.service
                .sign_in_email(
                    &sign_in_request("forgetful@example.com", "secret123"),
                    &RequestMeta::default(),
                )
                .await
                .is_err()
        );
        assert!(
            auth.service
                .sign_in_email(
                    &sign_in_request("forgetful@example.com", "brand-new-pass"),
                    &RequestMeta::default(),
                )
                .await
                .is_ok()
        );

        let err = auth
            .service
            .reset_password(&ResetPasswordRequest {
                new_password: "another-pass".to_string(),
                token,
                confirm_password: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn rejected_password_keeps_reset_token() {
        let auth = test_auth();
        signed_up(&auth, "keep@example.com").await;
        auth.service
            .request_password_reset("keep@example.com", None)
            .await
            .unwrap();
        let token = auth.emails.token_for("keep@example.com").unwrap();

        for (password, confirmation) in [("12345", None), ("secret123", Some("secret124"))] {
            let err = auth
                .service
                .reset_password(&ResetPasswordRequest {
                    new_password: password.to_string(),
                    token: token.clone(),
                    confirm_password: confirmation.map(str::to_string),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)));
        }

        assert!(
            auth.service
                .reset_password(&ResetPasswordRequest {
                    new_password: "secret123".to_string(),
                    token,
                    confirm_password: None,
                })
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn reset_for_unknown_email_sends_nothing() {
        let auth = test_auth();
        auth.service
            .request_password_reset("ghost@example.com", None)
            .await
            .unwrap();
        assert!(auth.emails.sent().is_empty());
    }

    #[tokio::test]
    async fn untrusted_redirects_are_rejected() {
        let auth = test_auth();
        let err = auth
            .service
            .request_password_reset("a@example.com", Some("https://evil.example/steal"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UntrustedRedirect));
    }

    #[tokio::test]
    async fn only_admins_change_roles() {
        let auth = test_auth_with(AuthConfig {
            admin_emails: vec!["admin@example.com".to_string()],
            ..AuthConfig::default()
        });
        let admin = signed_up(&auth, "admin@example.com").await;
        let student = signed_up(&auth, "student@example.com").await;

        let err = auth
            .service
            .set_role(&student, student.id, Role::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));

        let updated = auth
            .service
            .set_role(&admin, student.id, Role::Both)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Both);

        let err = auth
            .service
            .set_role(&admin, Uuid::new_v4(), Role::Natural)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn social_profile_creates_then_reuses_user() {
        let auth = test_auth();
        let profile = OAuthUserProfile {
            id: "google-42".to_string(),
            email: "Social@Example.com".to_string(),
            name: None,
            image: Some("https://img.example/p.png".to_string()),
            verified_email: true,
            provider: OAuthProvider::Google,
        };

        let first = auth
            .service
            .sign_in_with_profile(&profile, &RequestMeta::default())
            .await
            .unwrap();
        assert_eq!(first.user.email, "social@example.com");
        assert_eq!(first.user.name, "social");
        assert!(first.user.email_verified);
        assert!(first.user.password_hash.is_none());

        let second = auth
            .service
            .sign_in_with_profile(&profile, &RequestMeta::default())
            .await
            .unwrap();
        assert_eq!(second.user.id, first.user.id);
        assert_ne!(second.session.token, first.session.token);
    }

    #[tokio::test]
    async fn social_link_drops_unverified_password() {
        let auth = test_auth();
        let user = auth
            .service
            .sign_up_email(
                &sign_up_request("claimed@example.com", "squatter-pw1"),
                &RequestMeta::default(),
            )
            .await
            .unwrap()
            .user;
        assert!(!user.email_verified);

        let profile = OAuthUserProfile {
            id: "google-99".to_string(),
            email: "claimed@example.com".to_string(),
            name: Some("Owner".to_string()),
            image: None,
            verified_email: true,
            provider: OAuthProvider::Google,
        };
        let linked = auth
            .service
            .sign_in_with_profile(&profile, &RequestMeta::default())
            .await
            .unwrap();
        assert_eq!(linked.user.id, user.id);
        assert!(linked.user.email_verified);
        assert!(linked.user.password_hash.is_none());

        let err = auth
            .service
            .sign_in_email(
                &sign_in_request("claimed@example.com", "squatter-pw1"),
                &RequestMeta::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unverified_social_email_does_not_take_over_account() {
        let auth = test_auth();
        signed_up(&auth, "owner@example.com").await;

        let profile = OAuthUserProfile {
            id: "google-7".to_string(),
            email: "owner@example.com".to_string(),
            name: Some("Intruder".to_string()),
            image: None,
            verified_email: false,
            provider: OAuthProvider::Google,
        };
        let err = auth
            .service
            .sign_in_with_profile(&profile, &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OAuth(_)));
    }

    #[tokio::test]
    async fn social_sign_in_needs_configured_provider() {
        let auth = test_auth();
        let err = auth
            .service
            .social_sign_in_url("google", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderNotFound(_)));

        let err = auth
            .service
            .social_sign_in_url("myspace", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderNotFound(_)));
    }

    #[tokio::test]
    async fn callback_with_unknown_state_fails() {
        let auth = test_auth();
        let query = OAuthCallbackQuery {
            code: Some("code".to_string()),
            state: Some("never-issued".to_string()),
            error: None,
        };
        let err = auth
            .service
            .complete_social_sign_in("google", &query, &RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OAuth(_)));
    }

    #[tokio::test]
    async fn sign_out_invalidates_session() {
        let auth = test_auth();
        let outcome = auth
            .service
            .sign_up_email(
                &sign_up_request("leaver@example.com", "secret123"),
                &RequestMeta::default(),
            )
            .await
            .unwrap();
        let token = outcome.session.unwrap().token;

        auth.service.sign_out(Some(&token)).await.unwrap();
        assert!(auth.service.session_for_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_user_changes_name() {
        let auth = test_auth();
        let user = signed_up(&auth, "rename@example.com").await;

        let updated = auth
            .service
            .update_user(
                &user,
                &UpdateUserRequest {
                    name: Some("  Meron ".to_string()),
                    image: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Meron");

        let err = auth
            .service
            .update_user(
                &user,
                &UpdateUserRequest {
                    name: None,
                    image: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }
}
