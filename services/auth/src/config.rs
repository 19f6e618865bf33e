//! Auth service configuration

use anyhow::Result;
use std::str::FromStr;

/// Upper bound for any configured lifetime (one year)
pub const MAX_TTL_SECONDS: u64 = 31_536_000;

/// Auth service configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Public URL the auth routes are served from, used to build email links
    pub base_url: String,
    /// Origins allowed for CORS and for post-auth redirects
    pub trusted_origins: Vec<String>,
    /// Session lifetime in seconds (default: 7 days)
    pub session_ttl_seconds: u64,
    /// Age after which a used session is extended (default: 1 day)
    pub session_update_age_seconds: u64,
    /// Lifetime of verification and reset tokens in seconds (default: 1 hour)
    pub verification_ttl_seconds: u64,
    /// Refuse email sign-in until the address is verified
    pub require_email_verification: bool,
    /// Send the verification email right after sign-up
    pub send_verification_on_sign_up: bool,
    /// Start a session when a verification link is followed
    pub auto_sign_in_after_verification: bool,
    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
    /// Emails that receive the ADMIN role on sign-up
    pub admin_emails: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            trusted_origins: vec!["http://localhost:5173".to_string()],
            session_ttl_seconds: 604_800,
            session_update_age_seconds: 86_400,
            verification_ttl_seconds: 3_600,
            require_email_verification: false,
            send_verification_on_sign_up: true,
            auto_sign_in_after_verification: true,
            cookie_secure: false,
            admin_emails: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Create a new AuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_BASE_URL` (default: "http://localhost:3000")
    /// - `TRUSTED_ORIGINS`: comma separated (default: "http://localhost:5173")
    /// - `AUTH_SESSION_TTL_SECONDS` (default: 604800)
    /// - `AUTH_SESSION_UPDATE_AGE_SECONDS` (default: 86400)
    /// - `AUTH_VERIFICATION_TTL_SECONDS` (default: 3600)
    /// - `AUTH_REQUIRE_EMAIL_VERIFICATION` (default: false)
    /// - `AUTH_SEND_VERIFICATION_ON_SIGN_UP` (default: true)
    /// - `AUTH_AUTO_SIGN_IN_AFTER_VERIFICATION` (default: true)
    /// - `AUTH_COOKIE_SECURE` (default: false)
    /// - `ADMIN_EMAILS`: comma separated (default: empty)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let base_url = std::env::var("AUTH_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let trusted_origins = std::env::var("TRUSTED_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.trusted_origins);

        let admin_emails = std::env::var("ADMIN_EMAILS")
            .map(|raw| {
                split_list(&raw)
                    .into_iter()
                    .map(|email| email.to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        let config = AuthConfig {
            base_url,
            trusted_origins,
            session_ttl_seconds: env_or("AUTH_SESSION_TTL_SECONDS", defaults.session_ttl_seconds),
            session_update_age_seconds: env_or(
                "AUTH_SESSION_UPDATE_AGE_SECONDS",
                defaults.session_update_age_seconds,
            ),
            verification_ttl_seconds: env_or(
                "AUTH_VERIFICATION_TTL_SECONDS",
                defaults.verification_ttl_seconds,
            ),
            require_email_verification: env_flag(
                "AUTH_REQUIRE_EMAIL_VERIFICATION",
                defaults.require_email_verification,
            ),
            send_verification_on_sign_up: env_flag(
                "AUTH_SEND_VERIFICATION_ON_SIGN_UP",
                defaults.send_verification_on_sign_up,
            ),
            auto_sign_in_after_verification: env_flag(
                "AUTH_AUTO_SIGN_IN_AFTER_VERIFICATION",
                defaults.auto_sign_in_after_verification,
            ),
            cookie_secure: env_flag("AUTH_COOKIE_SECURE", defaults.cookie_secure),
            admin_emails,
        };

        for (key, value) in [
            ("AUTH_SESSION_TTL_SECONDS", config.session_ttl_seconds),
            ("AUTH_SESSION_UPDATE_AGE_SECONDS", config.session_update_age_seconds),
            ("AUTH_VERIFICATION_TTL_SECONDS", config.verification_ttl_seconds),
        ] {
            if value > MAX_TTL_SECONDS {
                anyhow::bail!("{key} ({value}) exceeds the maximum of {MAX_TTL_SECONDS} seconds");
            }
        }
        if config.session_ttl_seconds == 0 {
            anyhow::bail!("AUTH_SESSION_TTL_SECONDS must be greater than zero");
        }
        if config.verification_ttl_seconds == 0 {
            anyhow::bail!("AUTH_VERIFICATION_TTL_SECONDS must be greater than zero");
        }

        Ok(config)
    }

    /// Where to send the browser when a flow has no explicit callback
    pub fn default_redirect(&self) -> &str {
        self.trusted_origins
            .first()
            .map(String::as_str)
            .unwrap_or("/")
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email.trim()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().trim_end_matches('/').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
