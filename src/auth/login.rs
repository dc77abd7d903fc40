//! Login URL orchestration.

use tracing::info;
use url::Url;
use uuid::Uuid;

use super::PendingLogin;
use crate::{Error, Result, config::IdpConfig, store::TtlRepository};

/// Builds the IdP authorization redirect and records the pending attempt.
pub struct LoginOrchestrator {
    config: IdpConfig,
    pending: TtlRepository<PendingLogin>,
}

impl LoginOrchestrator {
    /// Bind the orchestrator to its IdP configuration and pending keyspace.
    pub fn new(config: IdpConfig, pending: TtlRepository<PendingLogin>) -> Self {
        Self { config, pending }
    }

    /// Build the authorization URL for a fresh login attempt.
    ///
    /// The state/nonce pair is persisted before the URL is returned, so a
    /// returned URL always has a matching pending record. Configuration is
    /// checked first; a misconfigured instance never generates values it
    /// cannot use.
    pub async fn login_url(&self) -> Result<Url> {
        if self.config.base_url.trim().is_empty()
            || self.config.redirect_uri.trim().is_empty()
            || self.config.client_id.trim().is_empty()
        {
            return Err(Error::Configuration(
                "Required identity provider configuration parameters are missing".to_string(),
            ));
        }

        let state = Uuid::new_v4().to_string();
        let nonce = Uuid::new_v4().to_string();

        let mut url = Url::parse(&format!(
            "{}/login",
            self.config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| Error::Configuration(format!("invalid IdP base URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("scope", "openid")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("redirect_uri", &self.config.redirect_uri);

        self.pending.save(&PendingLogin { state: state.clone(), nonce: nonce.clone() }).await?;
        info!(state, nonce, "Issued login redirect");

        Ok(url)
    }
}
