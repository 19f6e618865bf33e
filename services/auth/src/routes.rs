//! Authentication routes, mounted by the API under [`AUTH_BASE_PATH`]

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, header::SET_COOKIE},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{AuthError, AuthResult},
    middleware::{AuthUser, require_session},
    models::{
        Session, User,
        requests::{
            CallbackQuery, ForgetPasswordRequest, OAuthCallbackQuery, ResetPasswordRequest,
            SendVerificationEmailRequest, SetRoleRequest, SignInEmailRequest, SignUpEmailRequest,
            SocialSignInRequest, UpdateUserRequest, VerifyEmailQuery,
        },
    },
    service::{AuthService, with_query_param},
    session::{RequestMeta, extract_session_token},
};

/// Path prefix the auth router is nested under
pub const AUTH_BASE_PATH: &str = "/api/auth";

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub token: Option<String>,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub redirect: bool,
    pub token: String,
    pub url: Option<String>,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct SocialSignInResponse {
    pub url: String,
    pub redirect: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Session,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailResponse {
    pub status: bool,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UpdateUserResponse {
    pub status: bool,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub success: bool,
}

/// Create the router for the authentication service
pub fn create_router(service: AuthService) -> Router {
    let protected = Router::new()
        .route("/update-user", post(update_user))
        .route("/admin/set-role", post(set_role))
        .route_layer(middleware::from_fn_with_state(
            service.clone(),
            require_session,
        ));

    Router::new()
        .route("/sign-up/email", post(sign_up_email))
        .route("/sign-in/email", post(sign_in_email))
        .route("/sign-in/social", post(sign_in_social))
        .route("/callback/:provider", get(oauth_callback))
        .route("/sign-out", post(sign_out))
        .route("/get-session", get(get_session))
        .route("/send-verification-email", post(send_verification_email))
        .route("/verify-email", get(verify_email))
        .route("/forget-password", post(forget_password))
        .route("/reset-password/:token", get(reset_password_link))
        .route("/reset-password", post(reset_password))
        .merge(protected)
        .with_state(service)
}

/// Email/password sign-up endpoint
pub async fn sign_up_email(
    State(service): State<AuthService>,
    headers: HeaderMap,
    Json(payload): Json<SignUpEmailRequest>,
) -> AuthResult<Response> {
    info!("Sign-up attempt");

    let meta = RequestMeta::from_headers(&headers);
    let outcome = service.sign_up_email(&payload, &meta).await?;

    let body = Json(SignUpResponse {
        token: outcome.session.as_ref().map(|s| s.token.clone()),
        user: outcome.user,
    });

    match outcome.session {
        Some(session) => {
            let cookie = service.session_cookie(&session.token)?;
            Ok(([(SET_COOKIE, cookie)], body).into_response())
        }
        None => Ok(body.into_response()),
    }
}

/// Email/password sign-in endpoint
pub async fn sign_in_email(
    State(service): State<AuthService>,
    headers: HeaderMap,
    Json(payload): Json<SignInEmailRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Sign-in attempt");

    let meta = RequestMeta::from_headers(&headers);
    let outcome = service.sign_in_email(&payload, &meta).await?;
    let cookie = service.session_cookie(&outcome.session.token)?;

    let response = SignInResponse {
        redirect: outcome.callback_url.is_some(),
        token: outcome.session.token,
        url: outcome.callback_url,
        user: outcome.user,
    };

    Ok(([(SET_COOKIE, cookie)], Json(response)))
}

/// Start a social sign-in and hand back the provider consent URL
pub async fn sign_in_social(
    State(service): State<AuthService>,
    Json(payload): Json<SocialSignInRequest>,
) -> AuthResult<Json<SocialSignInResponse>> {
    info!("Social sign-in via {}", payload.provider);

    let url = service
        .social_sign_in_url(&payload.provider, payload.callback_url.as_deref())
        .await?;

    Ok(Json(SocialSignInResponse {
        url,
        redirect: true,
    }))
}

/// Provider redirect target completing a social sign-in
pub async fn oauth_callback(
    State(service): State<AuthService>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let meta = RequestMeta::from_headers(&headers);

    let outcome = match service.complete_social_sign_in(&provider, &query, &meta).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("OAuth callback for {} failed: {}", provider, e);
            if matches!(e, AuthError::Database(_) | AuthError::Internal(_)) {
                return e.into_response();
            }
            let target = with_query_param(service.config().default_redirect(), "error", e.code());
            return Redirect::to(&target).into_response();
        }
    };

    match service.session_cookie(&outcome.sign_in.session.token) {
        Ok(cookie) => (
            [(SET_COOKIE, cookie)],
            Redirect::to(&outcome.callback_url),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Sign-out endpoint; always clears the cookie
pub async fn sign_out(
    State(service): State<AuthService>,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse> {
    let token = extract_session_token(&headers);
    service.sign_out(token.as_deref()).await?;
    let cookie = service.clear_session_cookie()?;

    Ok(([(SET_COOKIE, cookie)], Json(SignOutResponse { success: true })))
}

/// Current session and user, or `null`
pub async fn get_session(
    State(service): State<AuthService>,
    headers: HeaderMap,
) -> AuthResult<Json<Option<SessionResponse>>> {
    let current = service.current_session(&headers).await?;

    Ok(Json(
        current.map(|(session, user)| SessionResponse { session, user }),
    ))
}

pub async fn send_verification_email(
    State(service): State<AuthService>,
    Json(payload): Json<SendVerificationEmailRequest>,
) -> AuthResult<Json<StatusResponse>> {
    service
        .send_verification_email(&payload.email, payload.callback_url.as_deref())
        .await?;

    Ok(Json(StatusResponse { status: true }))
}

/// Link target of the verification email
pub async fn verify_email(
    State(service): State<AuthService>,
    Query(query): Query<VerifyEmailQuery>,
    headers: HeaderMap,
) -> AuthResult<Response> {
    let callback = match query.callback_url.as_deref() {
        Some(target) => Some(service.resolve_redirect(Some(target))?),
        None => None,
    };
    let meta = RequestMeta::from_headers(&headers);

    let outcome = match service.verify_email(&query.token, &meta).await {
        Ok(outcome) => outcome,
        Err(AuthError::InvalidToken) if callback.is_some() => {
            let target = with_query_param(
                callback.as_deref().unwrap_or_default(),
                "error",
                AuthError::InvalidToken.code(),
            );
            return Ok(Redirect::to(&target).into_response());
        }
        Err(e) => return Err(e),
    };

    let cookie = match &outcome.session {
        Some(session) => Some(service.session_cookie(&session.token)?),
        None => None,
    };

    let mut response = match callback {
        Some(target) => Redirect::to(&target).into_response(),
        None => Json(VerifyEmailResponse {
            status: true,
            user: outcome.user,
        })
        .into_response(),
    };
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }

    Ok(response)
}

pub async fn forget_password(
    State(service): State<AuthService>,
    Json(payload): Json<ForgetPasswordRequest>,
) -> AuthResult<Json<StatusResponse>> {
    info!("Password reset requested");

    service
        .request_password_reset(&payload.email, payload.redirect_to.as_deref())
        .await?;

    Ok(Json(StatusResponse { status: true }))
}

/// Link target of the reset email; forwards the token to the SPA
pub async fn reset_password_link(
    State(service): State<AuthService>,
    Path(token): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> AuthResult<Redirect> {
    let target = service
        .reset_password_link(&token, query.callback_url.as_deref())
        .await?;

    Ok(Redirect::to(&target))
}

pub async fn reset_password(
    State(service): State<AuthService>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<Json<StatusResponse>> {
    service.reset_password(&payload).await?;

    Ok(Json(StatusResponse { status: true }))
}

pub async fn update_user(
    State(service): State<AuthService>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdateUserRequest>,
) -> AuthResult<Json<UpdateUserResponse>> {
    let user = service.update_user(&auth.user, &payload).await?;

    Ok(Json(UpdateUserResponse { status: true, user }))
}

/// Admin-only role assignment
pub async fn set_role(
    State(service): State<AuthService>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<SetRoleRequest>,
) -> AuthResult<Json<User>> {
    let user = service
        .set_role(&auth.user, payload.user_id, payload.role)
        .await?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AuthConfig,
        testutil::{TestAuth, test_auth, test_auth_with},
    };
    use axum::{
        body::Body,
        http::{
            Request, StatusCode,
            header::{CONTENT_TYPE, COOKIE, LOCATION},
        },
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// `name=value` part of the response's Set-Cookie header
    fn session_cookie(response: &Response) -> String {
        let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        header.split(';').next().unwrap().to_string()
    }

    async fn sign_up(auth: &TestAuth, email: &str) -> String {
        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-up/email",
                json!({"email": email, "password": "secret123", "name": "Abel"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response)
    }

    #[tokio::test]
    async fn sign_up_sets_cookie_and_returns_user() {
        let auth = test_auth();
        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-up/email",
                json!({"email": "abel@example.com", "password": "secret123", "name": "Abel"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("exam_session="));
        assert!(set_cookie.contains("HttpOnly"));

        let body = body_json(response).await;
        assert_eq!(body["user"]["email"], "abel@example.com");
        assert_eq!(body["user"]["role"], "USER");
        assert_eq!(body["user"]["emailVerified"], false);
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["token"].is_string());
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_unprocessable() {
        let auth = test_auth();
        sign_up(&auth, "twice@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-up/email",
                json!({"email": "twice@example.com", "password": "secret123", "name": "Again"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["code"], "USER_ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn get_session_follows_cookie() {
        let auth = test_auth();

        let response = create_router(auth.service.clone())
            .oneshot(get_request("/get-session", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.is_null());

        let cookie = sign_up(&auth, "session@example.com").await;
        let response = create_router(auth.service.clone())
            .oneshot(get_request("/get-session", Some(&cookie)))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["user"]["email"], "session@example.com");
        assert_eq!(body["session"]["userId"], body["user"]["id"]);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let auth = test_auth();
        sign_up(&auth, "pw@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-in/email",
                json!({"email": "pw@example.com", "password": "not-it"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "INVALID_EMAIL_OR_PASSWORD");
    }

    #[tokio::test]
    async fn sign_in_echoes_trusted_callback() {
        let auth = test_auth();
        sign_up(&auth, "cb@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-in/email",
                json!({
                    "email": "cb@example.com",
                    "password": "secret123",
                    "callbackURL": "http://localhost:5173/dashboard"
                }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["redirect"], true);
        assert_eq!(body["url"], "http://localhost:5173/dashboard");
    }

    #[tokio::test]
    async fn sign_in_returns_resolved_callback() {
        let auth = test_auth();
        sign_up(&auth, "trim@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-in/email",
                json!({
                    "email": "trim@example.com",
                    "password": "secret123",
                    "callbackURL": "  /dashboard  "
                }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["redirect"], true);
        assert_eq!(body["url"], "/dashboard");
    }

    #[tokio::test]
    async fn untrusted_callback_is_forbidden() {
        let auth = test_auth();
        sign_up(&auth, "cb2@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-in/email",
                json!({
                    "email": "cb2@example.com",
                    "password": "secret123",
                    "callbackURL": "https://attacker.example/"
                }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "INVALID_CALLBACK_URL");
    }

    #[tokio::test]
    async fn sign_out_clears_cookie_and_session() {
        let auth = test_auth();
        let cookie = sign_up(&auth, "out@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json("/sign-out", json!({}), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));

        let response = create_router(auth.service.clone())
            .oneshot(get_request("/get-session", Some(&cookie)))
            .await
            .unwrap();
        assert!(body_json(response).await.is_null());
    }

    #[tokio::test]
    async fn verify_email_redirects_and_signs_in() {
        let auth = test_auth();
        sign_up(&auth, "verify@example.com").await;
        let token = auth.emails.token_for("verify@example.com").unwrap();

        let response = create_router(auth.service.clone())
            .oneshot(get_request(
                &format!("/verify-email?token={token}&callbackURL=/welcome"),
                None,
            ))
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/welcome");
        assert!(response.headers().get(SET_COOKIE).is_some());

        let response = create_router(auth.service.clone())
            .oneshot(get_request(
                &format!("/verify-email?token={token}&callbackURL=/welcome"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/welcome?error=INVALID_TOKEN"
        );
    }

    #[tokio::test]
    async fn verify_email_without_callback_returns_json() {
        let auth = test_auth();
        let response = create_router(auth.service.clone())
            .oneshot(get_request("/verify-email?token=bogus", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn reset_link_forwards_token_to_spa() {
        let auth = test_auth();
        sign_up(&auth, "reset@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/forget-password",
                json!({"email": "reset@example.com", "redirectTo": "http://localhost:5173/reset"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], true);

        let link = auth.emails.last_to("reset@example.com").unwrap().action_url;
        assert!(link.starts_with("http://localhost:3000/api/auth/reset-password/"));
        let token = auth.emails.token_for("reset@example.com").unwrap();

        let response = create_router(auth.service.clone())
            .oneshot(get_request(
                &format!("/reset-password/{token}?callbackURL=http://localhost:5173/reset"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(LOCATION).unwrap().to_str().unwrap(),
            format!("http://localhost:5173/reset?token={token}")
        );

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/reset-password",
                json!({"newPassword": "fresh-pass-1", "token": token}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], true);
    }

    #[tokio::test]
    async fn short_reset_password_is_rejected() {
        let auth = test_auth();
        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/reset-password",
                json!({"newPassword": "123", "token": "whatever"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn protected_routes_require_session() {
        let auth = test_auth();
        let response = create_router(auth.service.clone())
            .oneshot(post_json("/update-user", json!({"name": "X"}), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_user_uses_session_user() {
        let auth = test_auth();
        let cookie = sign_up(&auth, "profile@example.com").await;

        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/update-user",
                json!({"name": "Liya", "image": "https://img.example/l.png"}),
                Some(&cookie),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user"]["name"], "Liya");
        assert_eq!(body["user"]["image"], "https://img.example/l.png");
    }

    #[tokio::test]
    async fn set_role_requires_admin() {
        let auth = test_auth_with(AuthConfig {
            admin_emails: vec!["head@example.com".to_string()],
            ..AuthConfig::default()
        });
        let student_cookie = sign_up(&auth, "pupil@example.com").await;
        let admin_cookie = sign_up(&auth, "head@example.com").await;
        let student = auth
            .service
            .session_for_token(student_cookie.trim_start_matches("exam_session="))
            .await
            .unwrap()
            .unwrap()
            .1;

        let body = json!({"userId": student.id, "role": "NATURAL"});

        let response = create_router(auth.service.clone())
            .oneshot(post_json("/admin/set-role", body.clone(), Some(&student_cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = create_router(auth.service.clone())
            .oneshot(post_json("/admin/set-role", body, Some(&admin_cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["role"], "NATURAL");
    }

    #[tokio::test]
    async fn social_sign_in_without_provider_is_not_found() {
        let auth = test_auth();
        let response = create_router(auth.service.clone())
            .oneshot(post_json(
                "/sign-in/social",
                json!({"provider": "google"}),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "PROVIDER_NOT_FOUND");
    }

    #[tokio::test]
    async fn oauth_callback_errors_redirect_home() {
        let auth = test_auth();
        let response = create_router(auth.service.clone())
            .oneshot(get_request("/callback/google?error=access_denied", None))
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "http://localhost:5173?error=OAUTH_FAILED"
        );
    }
}
