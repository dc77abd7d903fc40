//! Cached provider signing keys.
//!
//! Keys are fetched from the provider's JWKS endpoint, filtered to RSA, and
//! stored in their own TTL keyspace so a restart or cache expiry simply
//! triggers a refetch. Malformed RSA entries (missing `kid`, `n` or `e`, or
//! components that do not decode as base64url) are upstream data errors, not
//! keys to skip.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Error, Result,
    idp::{IdentityProvider, Jwk},
    store::{Keyed, TtlRepository},
};

/// One RSA signing key as cached locally: the `kid` plus the base64url
/// modulus and exponent straight from the JWKS document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Key identifier from the JWKS entry.
    pub kid: String,
    /// RSA modulus, base64url without padding.
    pub n: String,
    /// RSA public exponent, base64url without padding.
    pub e: String,
}

impl Keyed for SigningKey {
    fn store_key(&self) -> String {
        self.kid.clone()
    }
}

impl SigningKey {
    /// Build a verification key from the cached components.
    pub fn decoding_key(&self) -> Result<DecodingKey> {
        Ok(DecodingKey::from_rsa_components(&self.n, &self.e)?)
    }

    /// Decode the raw (modulus, exponent) bytes, validating the base64url
    /// encoding of both components.
    pub fn rsa_components(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let n = URL_SAFE_NO_PAD.decode(&self.n).map_err(|e| Error::IdentityProvider {
            state: None,
            message: format!("malformed RSA modulus for key [{}]: {e}", self.kid),
        })?;
        let e = URL_SAFE_NO_PAD.decode(&self.e).map_err(|e| Error::IdentityProvider {
            state: None,
            message: format!("malformed RSA exponent for key [{}]: {e}", self.kid),
        })?;
        Ok((n, e))
    }
}

/// TTL-backed cache of the provider's RSA signing keys.
pub struct SigningKeyCache {
    repo: TtlRepository<SigningKey>,
    idp: Arc<dyn IdentityProvider>,
}

impl SigningKeyCache {
    /// Bind the cache to its keyspace and the provider it refreshes from.
    #[must_use]
    pub fn new(repo: TtlRepository<SigningKey>, idp: Arc<dyn IdentityProvider>) -> Self {
        Self { repo, idp }
    }

    /// All currently cached keys, in implementation-defined order.
    pub async fn cached(&self) -> Result<Vec<SigningKey>> {
        self.repo.list_all().await
    }

    /// Refetch the JWKS, replace the cached keys, and return the fresh set.
    ///
    /// A JWKS without a single RSA entry is a provider misconfiguration; an
    /// RSA entry missing `kid`/`n`/`e` is malformed upstream data.
    pub async fn refresh(&self) -> Result<Vec<SigningKey>> {
        let jwks = self.idp.fetch_jwks().await?;

        let rsa: Vec<Jwk> = jwks.keys.into_iter().filter(|k| k.kty == "RSA").collect();
        if rsa.is_empty() {
            return Err(Error::Configuration(
                "Cannot find any key with type [RSA] in the provider JWKS".to_string(),
            ));
        }

        let mut keys = Vec::with_capacity(rsa.len());
        for jwk in rsa {
            let key = signing_key_from_jwk(jwk)?;
            // Validate the encoding up front so a bad key fails the refresh
            // instead of every later verification attempt.
            key.rsa_components()?;
            self.repo.save(&key).await?;
            debug!(kid = %key.kid, "Cached provider signing key");
            keys.push(key);
        }

        info!(count = keys.len(), "Refreshed provider signing keys");
        Ok(keys)
    }

    /// Drop every cached key. Returns the number removed.
    pub async fn purge(&self) -> Result<usize> {
        self.repo.delete_all().await
    }
}

fn signing_key_from_jwk(jwk: Jwk) -> Result<SigningKey> {
    let required = |field: Option<String>, name: &str| -> Result<String> {
        match field {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(Error::IdentityProvider {
                state: None,
                message: format!("JWKS RSA key is missing required field: [{name}]"),
            }),
        }
    };

    Ok(SigningKey {
        kid: required(jwk.kid, "kid")?,
        n: required(jwk.n, "n")?,
        e: required(jwk.e, "e")?,
    })
}
