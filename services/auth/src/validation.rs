//! Input validation utilities

use oauth2::url::Url;
use regex::Regex;
use std::sync::OnceLock;

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_NAME_LENGTH: usize = 100;

/// Normalize an email for lookup and uniqueness checks
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok()
    });

    match regex {
        Some(regex) if regex.is_match(email) => Ok(()),
        _ => Err("Invalid email format".to_string()),
    }
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters long"
        ));
    }

    Ok(())
}

/// Validate a new password against its confirmation, when one was sent
pub fn validate_password_confirmation(
    password: &str,
    confirmation: Option<&str>,
) -> Result<(), String> {
    validate_password(password)?;

    match confirmation {
        Some(confirmation) if confirmation != password => {
            Err("Passwords do not match".to_string())
        }
        _ => Ok(()),
    }
}

/// Validate display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();

    if name.is_empty() {
        return Err("Name is required".to_string());
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!(
            "Name must be at most {MAX_NAME_LENGTH} characters long"
        ));
    }

    Ok(())
}

/// Check that a redirect target stays on a trusted origin
///
/// Relative paths are accepted; protocol-relative paths (`//host`) are not.
pub fn is_trusted_redirect(target: &str, trusted_origins: &[String]) -> bool {
    if target.starts_with('/') {
        return !target.starts_with("//") && !target.contains('\\');
    }

    let Ok(url) = Url::parse(target) else {
        return false;
    };
    let origin = url.origin().ascii_serialization();
    trusted_origins
        .iter()
        .any(|trusted| trusted.trim_end_matches('/') == origin)
}
