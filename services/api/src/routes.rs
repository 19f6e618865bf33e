//! API service routes

use axum::{
    Json, Router,
    extract::State,
    http::{
        HeaderMap, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::get,
};
use exam_auth::{models::User, routes::AUTH_BASE_PATH};
use serde::Serialize;
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{error::ApiResult, state::AppState};

/// Body of `GET /api/me`
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Create the router for the API service, with the auth routes nested in
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.auth.config().trusted_origins);
    let auth_routes = exam_auth::routes::create_router(state.auth.clone());

    Router::new()
        .route("/", get(root))
        .route("/hello", get(hello))
        .route("/health", get(health_check))
        .route("/api/me", get(me))
        .with_state(state)
        .nest(AUTH_BASE_PATH, auth_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// CORS for the SPA: trusted origins only, cookies allowed
fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid trusted origin {}: {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to the ExamMaster API"
    }))
}

pub async fn hello() -> &'static str {
    "Hello World!"
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "exam-api"
    }))
}

/// The signed-in user, or `{"success": false}`
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<MeResponse>> {
    let current = state.auth.current_session(&headers).await?;

    Ok(Json(match current {
        Some((_, user)) => MeResponse {
            success: true,
            user: Some(user),
        },
        None => MeResponse {
            success: false,
            user: None,
        },
    }))
}
