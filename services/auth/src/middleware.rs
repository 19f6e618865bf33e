//! Middleware resolving the session cookie into an authenticated user

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::info;

use crate::{
    error::AuthError,
    models::{Session, User},
    service::AuthService,
};

/// The signed-in user, inserted into request extensions by [`require_session`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session: Session,
}

/// Reject requests without a live session
pub async fn require_session(
    State(service): State<AuthService>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let (session, user) = service
        .current_session(req.headers())
        .await?
        .ok_or_else(|| {
            info!("Rejected request without a session: {}", req.uri().path());
            AuthError::Unauthorized
        })?;

    req.extensions_mut().insert(AuthUser { user, session });

    Ok(next.run(req).await)
}
