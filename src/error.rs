//! Error types for the auth gateway.
//!
//! Every failure in the orchestration chain is a typed variant here, and a
//! single exhaustive mapping ([`Error::problem`]) turns it into the
//! status/title/detail problem JSON returned to clients. Internal messages
//! (transport causes, nonce values, upstream bodies) are logged, never echoed.

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Result type alias for the auth gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Auth gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Fatal, caller-unfixable misconfiguration (missing base URL/client id,
    /// no usable key type in the provider's JWKS).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Client-attributable authentication failure: unknown or consumed
    /// `state`, nonce mismatch, or the IdP rejecting the code with 401/403.
    #[error("Authentication process error for state [{state}]: {message}")]
    AuthFailed {
        /// The OIDC `state` the failing request presented.
        state: String,
        /// Internal diagnostic message (logged, not echoed to the client).
        message: String,
    },

    /// Upstream identity-provider failure or malformed upstream response not
    /// attributable to the client. Surfaced as a bad-gateway-class error.
    #[error("Identity provider error for state [{}]: {message}", state.as_deref().unwrap_or("N/A"))]
    IdentityProvider {
        /// The OIDC `state` in flight, when the failure happened inside an
        /// exchange (JWKS fetches carry no state).
        state: Option<String>,
        /// Internal diagnostic message.
        message: String,
    },

    /// Missing, malformed, or unknown session token.
    #[error("Session validation failed: {0}")]
    SessionValidation(String),

    /// JWT decode / signature verification failure. Routed through the
    /// generic 500 handler, matching the source service.
    #[error("JWT validation error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Problem JSON body returned for every error response.
#[derive(Debug, Serialize)]
pub struct Problem {
    /// HTTP status code, repeated in the body.
    pub status: u16,
    /// Stable, short error title.
    pub title: String,
    /// Human-readable detail; never carries internal diagnostics.
    pub detail: String,
}

impl Error {
    /// HTTP status this error surfaces as.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthFailed { .. } | Self::SessionValidation(_) => StatusCode::UNAUTHORIZED,
            Self::IdentityProvider { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration(_)
            | Self::Jwt(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The externally visible `(status, title, detail)` triple.
    #[must_use]
    pub fn problem(&self) -> Problem {
        let status = self.status();
        let (title, detail) = match self {
            Self::Configuration(_) => (
                "Configuration error",
                "The service is misconfigured and cannot process the request".to_string(),
            ),
            Self::AuthFailed { state, .. } => (
                "Unauthorized",
                format!("Cannot perform authentication process for state: [{state}]"),
            ),
            Self::IdentityProvider { state, .. } => (
                "Error communicating with the identity provider",
                format!(
                    "Cannot perform authentication process for state: [{}]",
                    state.as_deref().unwrap_or("N/A")
                ),
            ),
            Self::SessionValidation(_) => {
                ("Unauthorized", "Session validation failed".to_string())
            }
            Self::Jwt(_) | Self::Json(_) | Self::Io(_) | Self::Internal(_) => (
                "Internal Server Error",
                "An unexpected error occurred processing the request".to_string(),
            ),
        };

        Problem {
            status: status.as_u16(),
            title: title.to_string(),
            detail,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Full internal message goes to the log; the client sees the problem body.
        error!(error = %self, "Request failed");
        let problem = self.problem();
        (self.status(), Json(problem)).into_response()
    }
}
