//! Authentication for the ExamMaster backend
//!
//! Email/password and Google sign-in, email verification, password reset and
//! cookie sessions. [`service::AuthService`] holds the rules;
//! [`routes::create_router`] exposes them over HTTP for the API to nest under
//! [`routes::AUTH_BASE_PATH`].

pub mod config;
pub mod database;
pub mod email;
pub mod error;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod service;
pub mod session;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod tokens;
pub mod validation;
pub mod verification;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use service::AuthService;
