//! HTTP client for the identity provider's token and JWKS endpoints.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{StatusCode, header::AUTHORIZATION};
use tracing::{debug, error};

use super::{IdentityProvider, JwksResponse, TokenData};
use crate::{Error, Result, config::IdpConfig};

/// Grant type literal the provider expects on the token endpoint.
const GRANT_TYPE: &str = "AUTHORIZATION_CODE";

/// `reqwest`-backed [`IdentityProvider`] implementation.
///
/// Carries the configured connect and read timeouts on every outbound call;
/// a timeout surfaces as a transport error and is mapped like any other
/// unhandled client failure.
pub struct IdpClient {
    http: reqwest::Client,
    config: IdpConfig,
}

impl IdpClient {
    /// Build a client from the IdP configuration.
    pub fn new(config: IdpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build IdP HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// `Basic` credentials over `client_id:client_secret`.
    fn basic_credentials(&self) -> String {
        STANDARD.encode(format!(
            "{}:{}",
            self.config.client_id, self.config.client_secret
        ))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl IdentityProvider for IdpClient {
    async fn exchange_code(&self, auth_code: &str, state: &str) -> Result<TokenData> {
        let url = self.endpoint("oidc/token");
        debug!(state, "Exchanging authorization code at token endpoint");

        let params = [
            ("grant_type", GRANT_TYPE),
            ("code", auth_code),
            ("redirect_uri", &self.config.redirect_uri),
        ];

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Basic {}", self.basic_credentials()))
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(state, error = %e, "Transport error retrieving id token");
                Error::IdentityProvider {
                    state: Some(state.to_string()),
                    message: format!("unhandled error retrieving id token: [{e}]"),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(state, status = %status, "Token endpoint returned error status");
            return Err(map_exchange_status(status, state));
        }

        response.json::<TokenData>().await.map_err(|e| Error::IdentityProvider {
            state: Some(state.to_string()),
            message: format!("malformed token endpoint response: [{e}]"),
        })
    }

    async fn fetch_jwks(&self) -> Result<JwksResponse> {
        let url = self.endpoint("oidc/keys");
        debug!(url = %url, "Fetching JWKS from identity provider");

        let response = self.http.get(&url).send().await.map_err(|e| {
            error!(error = %e, "Transport error fetching JWKS");
            Error::IdentityProvider {
                state: None,
                message: format!("unhandled error fetching JWKS: [{e}]"),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "JWKS endpoint returned error status");
            return Err(Error::IdentityProvider {
                state: None,
                message: format!("error fetching JWKS, http response code: [{status}]"),
            });
        }

        response.json::<JwksResponse>().await.map_err(|e| Error::IdentityProvider {
            state: None,
            message: format!("malformed JWKS response: [{e}]"),
        })
    }
}

/// Map a token-endpoint error status to the error taxonomy: the IdP rejecting
/// the client's credentials (401/403) is the client's failure; anything else
/// is an upstream failure.
fn map_exchange_status(status: StatusCode, state: &str) -> Error {
    let message = format!("error retrieving id token, http response code: [{status}]");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::AuthFailed {
            state: state.to_string(),
            message,
        },
        _ => Error::IdentityProvider {
            state: Some(state.to_string()),
            message,
        },
    }
}
