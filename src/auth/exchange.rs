//! Authorization code to session exchange.
//!
//! The happy path: look up the pending state, exchange the code at the IdP,
//! verify the identity token, check the nonce, mint a session. Before any of
//! that, the code itself is checked against the retry keyspace so a replayed
//! callback inside the retry window gets the session already minted for it
//! rather than a failure on the consumed state.

use std::sync::Arc;

use tracing::{info, warn};

use super::{AuthCodeSession, PendingLogin, UserInfo, UserSession, generate_session_token};
use crate::{
    Error, Result,
    idp::IdentityProvider,
    oidc::JwtValidator,
    store::TtlRepository,
};

/// Orchestrates the code-for-session exchange.
pub struct TokenExchangeOrchestrator {
    pending: TtlRepository<PendingLogin>,
    sessions: TtlRepository<UserSession>,
    codes: TtlRepository<AuthCodeSession>,
    idp: Arc<dyn IdentityProvider>,
    validator: JwtValidator,
    session_token_bytes: usize,
}

impl TokenExchangeOrchestrator {
    /// Wire the orchestrator over its keyspaces, the IdP, and the validator.
    #[must_use]
    pub fn new(
        pending: TtlRepository<PendingLogin>,
        sessions: TtlRepository<UserSession>,
        codes: TtlRepository<AuthCodeSession>,
        idp: Arc<dyn IdentityProvider>,
        validator: JwtValidator,
        session_token_bytes: usize,
    ) -> Self {
        Self {
            pending,
            sessions,
            codes,
            idp,
            validator,
            session_token_bytes,
        }
    }

    /// Exchange `auth_code` plus `state` for a session.
    pub async fn exchange(&self, auth_code: &str, state: &str) -> Result<UserSession> {
        // A code already exchanged inside the retry window resolves to the
        // session it minted, without touching the IdP again.
        if let Some(mapping) = self.codes.find_by_id(auth_code).await? {
            if let Some(session) = self.sessions.find_by_id(&mapping.session_token).await? {
                info!(state, "Authorization code already exchanged, returning existing session");
                return Ok(session);
            }
        }

        let pending = self.pending.find_by_id(state).await?.ok_or_else(|| {
            Error::AuthFailed {
                state: state.to_string(),
                message: "cannot retrieve OIDC session for input auth state".to_string(),
            }
        })?;

        let token_data = self.idp.exchange_code(auth_code, state).await?;
        let claims = self.validator.validate_and_parse(&token_data.id_token).await?;

        let token_nonce = claims.nonce.clone().unwrap_or_default();
        if token_nonce != pending.nonce {
            return Err(Error::AuthFailed {
                state: state.to_string(),
                message: format!(
                    "nonce mismatch! id token value: [{token_nonce}], cached value: [{}]",
                    pending.nonce
                ),
            });
        }

        let user_info = UserInfo {
            name: required_claim(claims.name, "name", state)?,
            family_name: required_claim(claims.family_name, "familyName", state)?,
            tax_id: required_claim(claims.fiscal_number, "fiscalNumber", state)?,
        };

        let session = UserSession {
            session_token: generate_session_token(self.session_token_bytes),
            user_info,
        };
        self.sessions.save(&session).await?;
        info!(state, "Issued session for verified identity");

        // Best effort: a failure here leaves a consumed-but-live state or a
        // missing retry mapping, neither of which invalidates the session.
        if let Err(err) = self.pending.delete(state).await {
            warn!(state, error = %err, "Failed to delete consumed pending login");
        }
        let mapping = AuthCodeSession {
            auth_code: auth_code.to_string(),
            session_token: session.session_token.clone(),
        };
        if let Err(err) = self.codes.save(&mapping).await {
            warn!(state, error = %err, "Failed to record authorization code mapping");
        }

        Ok(session)
    }
}

fn required_claim(value: Option<String>, claim: &str, state: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::IdentityProvider {
            state: Some(state.to_string()),
            message: format!("id token is missing required claim: [{claim}]"),
        }),
    }
}
