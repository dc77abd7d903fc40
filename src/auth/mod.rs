//! Authentication orchestration.
//!
//! The three flows live in their own modules: [`login`] builds the IdP
//! redirect and records the pending state/nonce pair, [`exchange`] turns an
//! authorization code plus state into an opaque session, and [`session`]
//! answers validate/whoami/logout for issued sessions. [`AuthService`] wires
//! them over shared keyspaces of one [`crate::store::TtlStore`].

pub mod exchange;
pub mod login;
pub mod session;

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    Result,
    config::Config,
    idp::IdentityProvider,
    oidc::{JwtValidator, SigningKey, SigningKeyCache},
    store::{Keyed, TtlRepository, TtlStore},
};

use exchange::TokenExchangeOrchestrator;
use login::LoginOrchestrator;
use session::SessionAuthority;

/// A login attempt awaiting its callback: the state/nonce pair issued when
/// the redirect URL was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Anti-CSRF correlation value, the entry's key.
    pub state: String,
    /// Anti-replay value the identity token must echo back.
    pub nonce: String,
}

impl Keyed for PendingLogin {
    fn store_key(&self) -> String {
        self.state.clone()
    }
}

/// Verified identity attributes carried by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Given name.
    pub name: String,
    /// Family name.
    pub family_name: String,
    /// National tax identifier.
    pub tax_id: String,
}

/// An issued session: the opaque bearer token plus the user it authenticates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    /// Opaque bearer token, the entry's key.
    pub session_token: String,
    /// The authenticated user.
    pub user_info: UserInfo,
}

impl Keyed for UserSession {
    fn store_key(&self) -> String {
        self.session_token.clone()
    }
}

/// Mapping from a consumed authorization code to the session it produced,
/// kept for the retry window so a replayed callback returns the same session
/// instead of failing on the already-deleted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeSession {
    /// The authorization code, the entry's key.
    pub auth_code: String,
    /// Token of the session minted for this code.
    pub session_token: String,
}

impl Keyed for AuthCodeSession {
    fn store_key(&self) -> String {
        self.auth_code.clone()
    }
}

/// Generate an opaque session token: `len_bytes` of CSPRNG output, URL-safe
/// base64 without padding.
pub(crate) fn generate_session_token(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    rand::rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Facade over the three authentication flows.
pub struct AuthService {
    login: LoginOrchestrator,
    exchange: TokenExchangeOrchestrator,
    sessions: SessionAuthority,
}

impl AuthService {
    /// Wire the flows over their keyspaces of the shared store.
    pub fn new(
        config: &Config,
        store: Arc<dyn TtlStore>,
        idp: Arc<dyn IdentityProvider>,
    ) -> Self {
        let pending: TtlRepository<PendingLogin> = TtlRepository::new(
            Arc::clone(&store),
            "pending-login",
            config.tokens.pending_login_ttl,
        );
        let sessions: TtlRepository<UserSession> = TtlRepository::new(
            Arc::clone(&store),
            "user-session",
            config.tokens.session_ttl,
        );
        let codes: TtlRepository<AuthCodeSession> = TtlRepository::new(
            Arc::clone(&store),
            "auth-code",
            config.tokens.auth_code_ttl,
        );
        let keys: TtlRepository<SigningKey> = TtlRepository::new(
            store,
            "signing-keys",
            config.tokens.signing_key_ttl,
        );

        let validator = JwtValidator::new(SigningKeyCache::new(keys, Arc::clone(&idp)));

        Self {
            login: LoginOrchestrator::new(config.idp.clone(), pending.clone()),
            exchange: TokenExchangeOrchestrator::new(
                pending,
                sessions.clone(),
                codes,
                idp,
                validator,
                config.tokens.session_token_bytes,
            ),
            sessions: SessionAuthority::new(sessions),
        }
    }

    /// Build the IdP login redirect URL, recording the pending attempt.
    pub async fn login(&self) -> Result<Url> {
        self.login.login_url().await
    }

    /// Exchange an authorization code and state for a session.
    pub async fn exchange(&self, auth_code: &str, state: &str) -> Result<UserSession> {
        self.exchange.exchange(auth_code, state).await
    }

    /// Resolve a session token to its user, failing if unknown or expired.
    pub async fn whoami(&self, session_token: &str) -> Result<UserInfo> {
        self.sessions.whoami(session_token).await
    }

    /// Check that a session token is live.
    pub async fn validate(&self, session_token: &str) -> Result<()> {
        self.sessions.validate(session_token).await
    }

    /// Revoke a session. Idempotent.
    pub async fn logout(&self, session_token: &str) -> Result<()> {
        self.sessions.logout(session_token).await
    }
}
