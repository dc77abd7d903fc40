//! HTTP router and handlers.
//!
//! Thin translation layer: handlers parse the request surface, call into
//! [`crate::auth::AuthService`], and map the result to the wire DTOs. All
//! error mapping happens in the [`crate::error`] `IntoResponse` impl.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info_span;

use crate::{
    Result,
    auth::{AuthService, session::bearer_token},
};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state.
pub struct AppState {
    /// The authentication flows.
    pub auth: Arc<AuthService>,
}

// ── Wire DTOs ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LoginResponse {
    #[serde(rename = "urlRedirect")]
    url_redirect: String,
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    #[serde(rename = "authCode")]
    auth_code: String,
    state: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    #[serde(rename = "authToken")]
    auth_token: String,
}

#[derive(Debug, Serialize)]
struct UserInfoResponse {
    name: String,
    #[serde(rename = "familyName")]
    family_name: String,
    #[serde(rename = "taxId")]
    tax_id: String,
}

// ── Router ─────────────────────────────────────────────────────────────

/// Build the application router with its middleware stack.
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/auth/login", get(login_handler))
        .route("/auth/token", post(token_handler))
        .route("/auth/users", get(users_handler))
        .route("/auth/validate", get(validate_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

// ── Handlers ───────────────────────────────────────────────────────────

/// GET /auth/login - build the IdP redirect for a fresh login attempt.
async fn login_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let url = state.auth.login().await?;
    Ok(Json(LoginResponse {
        url_redirect: url.to_string(),
    }))
}

/// POST /auth/token - exchange an authorization code for a session token.
async fn token_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuthRequest>,
) -> Result<impl IntoResponse> {
    let session = state
        .auth
        .exchange(&request.auth_code, &request.state)
        .await?;
    Ok(Json(AuthResponse {
        auth_token: session.session_token,
    }))
}

/// GET /auth/users - resolve the bearer session to its user.
async fn users_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let token = bearer_token(&headers)?;
    let user = state.auth.whoami(&token).await?;
    Ok(Json(UserInfoResponse {
        name: user.name,
        family_name: user.family_name,
        tax_id: user.tax_id,
    }))
}

/// GET /auth/validate - check the bearer session is live.
async fn validate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let token = bearer_token(&headers)?;
    state.auth.validate(&token).await?;
    Ok(StatusCode::OK)
}

/// POST /auth/logout - revoke the bearer session. Idempotent.
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let token = bearer_token(&headers)?;
    state.auth.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health - liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
