//! OAuth2 integration for Google sign-in

use anyhow::Result;
use chrono::Utc;
use exam_common::cache::CacheStore;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// OAuth state lifetime in seconds
const OAUTH_STATE_TTL_SECONDS: u64 = 600;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// OAuth2 provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    /// Get the provider name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            other => Err(other.to_string()),
        }
    }
}

/// OAuth2 configuration for a provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl OAuthConfig {
    /// Google configuration from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`
    ///
    /// Returns `None` when either variable is missing, which disables Google
    /// sign-in.
    pub fn google_from_env(base_url: &str) -> Option<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").ok()?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok()?;
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return None;
        }

        Some(Self::google(client_id, client_secret, base_url))
    }

    pub fn google(client_id: String, client_secret: String, base_url: &str) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_url: format!(
                "{}/api/auth/callback/google",
                base_url.trim_end_matches('/')
            ),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

/// OAuth2 client wrapper
#[derive(Clone)]
pub struct OAuthClient {
    provider: OAuthProvider,
    client: BasicClient,
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Create a new OAuth2 client for Google
    pub fn new_google(config: OAuthConfig) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(config.auth_url.clone())?,
            Some(TokenUrl::new(config.token_url.clone())?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?);

        Ok(Self {
            provider: OAuthProvider::Google,
            client,
            config,
            http: reqwest::Client::new(),
        })
    }

    /// Generate authorization URL with PKCE
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        info!("Generating authorization URL for {:?}", self.provider);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in ["openid", "email", "profile"] {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token) = request.url();

        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchange an authorization code for the provider access token
    pub async fn exchange_code(&self, code: String, pkce_verifier: PkceCodeVerifier) -> Result<String> {
        info!(
            "Exchanging authorization code for access token for {:?}",
            self.provider
        );

        let token_response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(oauth2::reqwest::async_http_client)
            .await?;

        Ok(token_response.access_token().secret().clone())
    }

    /// Get user profile information from the provider
    pub async fn get_user_profile(&self, access_token: &str) -> Result<OAuthUserProfile> {
        info!("Getting user profile for {:?}", self.provider);

        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get Google user profile: {}", response.status());
        }

        let google_user: GoogleUser = response.json().await?;
        Ok(google_user.into_profile())
    }

    /// Get the provider
    pub fn provider(&self) -> OAuthProvider {
        self.provider
    }
}

/// Google user profile response
#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl GoogleUser {
    fn into_profile(self) -> OAuthUserProfile {
        let name = self.name.filter(|n| !n.trim().is_empty()).or_else(|| {
            let parts: Vec<String> = [self.given_name, self.family_name]
                .into_iter()
                .flatten()
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });

        OAuthUserProfile {
            id: self.id,
            email: self.email,
            name,
            image: self.picture,
            verified_email: self.verified_email,
            provider: OAuthProvider::Google,
        }
    }
}

/// OAuth user profile information
#[derive(Debug, Clone)]
pub struct OAuthUserProfile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub verified_email: bool,
    pub provider: OAuthProvider,
}

/// Pending authorization, keyed by its CSRF state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSession {
    pub pkce_verifier: String,
    pub provider: OAuthProvider,
    pub callback_url: String,
    pub created_at: i64,
}

impl OAuthSession {
    pub fn new(pkce_verifier: String, provider: OAuthProvider, callback_url: String) -> Self {
        Self {
            pkce_verifier,
            provider,
            callback_url,
            created_at: Utc::now().timestamp(),
        }
    }
}

/// Cache-backed storage for pending authorizations
#[derive(Clone)]
pub struct OAuthStateStore {
    cache: Arc<dyn CacheStore>,
}

impl OAuthStateStore {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    fn key(state: &str) -> String {
        format!("oauth_state:{state}")
    }

    pub async fn save(&self, state: &str, session: &OAuthSession) -> Result<()> {
        self.cache
            .set(
                &Self::key(state),
                &serde_json::to_string(session)?,
                Some(OAUTH_STATE_TTL_SECONDS),
            )
            .await
    }

    /// Redeem a state; replays yield `None`
    pub async fn take(&self, state: &str) -> Result<Option<OAuthSession>> {
        match self.cache.take(&Self::key(state)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
