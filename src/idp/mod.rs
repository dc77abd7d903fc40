//! Identity provider gateway — the two outbound calls the core depends on.
//!
//! The [`IdentityProvider`] trait is the seam between the orchestration core
//! and the IdP's HTTP surface: exchanging an authorization code for an
//! identity token, and fetching the published JSON Web Key Set. Transport
//! failures are translated into the small typed error taxonomy in
//! [`crate::error`] by the [`client::IdpClient`] implementation.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use client::IdpClient;

/// Token endpoint response carrying the IdP-issued identity token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    /// The signed JWT identity token.
    pub id_token: String,
}

/// One entry of the provider's JWKS document.
///
/// Fields are optional at the wire level; [`crate::oidc::SigningKeyCache`]
/// rejects RSA keys with missing `kid`/`n`/`e` as malformed upstream data
/// instead of silently skipping them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, e.g. `RSA` or `EC`. Only RSA keys are used.
    #[serde(default)]
    pub kty: String,
    /// Key identifier.
    #[serde(default)]
    pub kid: Option<String>,
    /// RSA modulus, base64url-encoded unsigned big-endian integer.
    #[serde(default)]
    pub n: Option<String>,
    /// RSA public exponent, same encoding as `n`.
    #[serde(default)]
    pub e: Option<String>,
    /// Any further JWK members (`alg`, `use`, ...), carried opaquely.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// JWKS endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// The published keys.
    pub keys: Vec<Jwk>,
}

/// The identity provider as seen by the orchestration core.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Exchange an authorization code for the IdP-issued identity token.
    ///
    /// `state` is carried for error context only; the IdP does not receive it
    /// on this call.
    async fn exchange_code(&self, auth_code: &str, state: &str) -> Result<TokenData>;

    /// Fetch the provider's published JSON Web Key Set.
    async fn fetch_jwks(&self) -> Result<JwksResponse>;
}
