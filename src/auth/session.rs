//! Session validation, identity lookup, and revocation.

use axum::http::HeaderMap;
use tracing::{debug, info};

use super::{UserInfo, UserSession};
use crate::{Error, Result, store::TtlRepository};

/// Answers validate/whoami/logout against the session keyspace.
pub struct SessionAuthority {
    sessions: TtlRepository<UserSession>,
}

impl SessionAuthority {
    /// Bind the authority to the session keyspace.
    pub fn new(sessions: TtlRepository<UserSession>) -> Self {
        Self { sessions }
    }

    /// Resolve a session token to the user it authenticates.
    pub async fn whoami(&self, session_token: &str) -> Result<UserInfo> {
        let session = self.find(session_token).await?;
        Ok(session.user_info)
    }

    /// Check that a session token is live.
    pub async fn validate(&self, session_token: &str) -> Result<()> {
        self.find(session_token).await.map(|_| ())
    }

    /// Revoke a session. Revoking an unknown or already-revoked token is not
    /// an error.
    pub async fn logout(&self, session_token: &str) -> Result<()> {
        let removed = self.sessions.delete(session_token).await?;
        if removed {
            info!("Session revoked");
        } else {
            debug!("Logout for unknown or already-revoked session token");
        }
        Ok(())
    }

    async fn find(&self, session_token: &str) -> Result<UserSession> {
        self.sessions
            .find_by_id(session_token)
            .await?
            .ok_or_else(|| Error::SessionValidation("invalid or missing session token".to_string()))
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// The `Bearer` prefix is matched case-insensitively; a missing header, a
/// different scheme, or an empty token all fail the same way.
pub fn bearer_token(headers: &HeaderMap) -> Result<String> {
    let invalid = || Error::SessionValidation("missing or invalid token".to_string());

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(invalid)?;

    if header.len() <= 7 || !header[..7].eq_ignore_ascii_case("bearer ") {
        return Err(invalid());
    }

    let token = header[7..].trim();
    if token.is_empty() {
        return Err(invalid());
    }
    Ok(token.to_string())
}
