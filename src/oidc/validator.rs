//! Identity token verification against the signing key cache.
//!
//! Verification never trusts the token's `kid` alone: every cached key is
//! tried, and on a miss the cache is refreshed from the provider and the
//! attempt repeated. If the token still verifies against nothing, the cache
//! is purged so stale keys from a completed rotation cannot linger.

use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::keys::{SigningKey, SigningKeyCache};
use crate::{Error, Result};

/// Clock skew allowance, in seconds, when a token carries `exp`/`nbf`.
const LEEWAY_SECS: u64 = 60;

/// Claims extracted from a verified identity token.
///
/// All fields are optional at the wire level; the exchange flow enforces
/// which ones it requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Given name.
    #[serde(default)]
    pub name: Option<String>,
    /// Family name.
    #[serde(default, rename = "familyName")]
    pub family_name: Option<String>,
    /// National tax identifier.
    #[serde(default, rename = "fiscalNumber")]
    pub fiscal_number: Option<String>,
    /// The nonce echoed back from the login request.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Remaining registered and provider-specific claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verifies identity tokens using the [`SigningKeyCache`].
pub struct JwtValidator {
    keys: SigningKeyCache,
}

impl JwtValidator {
    /// Build a validator over the given key cache.
    #[must_use]
    pub fn new(keys: SigningKeyCache) -> Self {
        Self { keys }
    }

    /// Verify `token`'s signature and return its claims.
    ///
    /// Tries every cached key, then refreshes from the provider and retries.
    /// A token no key can verify purges the cache and fails.
    pub async fn validate_and_parse(&self, token: &str) -> Result<IdentityClaims> {
        let header = decode_header(token)?;
        let validation = build_validation(&header);

        let cached = self.keys.cached().await?;
        match try_keys(&cached, token, &validation) {
            Ok(claims) => {
                debug!(kid = ?header.kid, "Identity token verified against cached key");
                return Ok(claims);
            }
            Err(err) => {
                debug!(kid = ?header.kid, error = %err, "No cached key verified the token, refreshing");
            }
        }

        let refreshed = self.keys.refresh().await?;
        match try_keys(&refreshed, token, &validation) {
            Ok(claims) => Ok(claims),
            Err(err) => {
                // None of the provider's current keys verify this token.
                match self.keys.purge().await {
                    Ok(count) => {
                        warn!(purged = count, "Identity token verified by no known key, purged key cache");
                    }
                    Err(purge_err) => {
                        warn!(error = %purge_err, "Failed to purge key cache after verification failure");
                    }
                }
                Err(err)
            }
        }
    }
}

/// Validation settings for this token's header.
///
/// Only the RSA family is accepted; an unexpected `alg` falls back to RS256,
/// which then fails verification rather than being trusted.
fn build_validation(header: &Header) -> Validation {
    let alg = match header.alg {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => header.alg,
        other => {
            warn!(alg = ?other, "Unsupported token algorithm, verification will use RS256");
            Algorithm::RS256
        }
    };

    let mut validation = Validation::new(alg);
    validation.leeway = LEEWAY_SECS;
    validation.validate_aud = false;
    // `exp` is checked when present but its absence is not an error.
    validation.required_spec_claims.clear();
    validation
}

fn try_keys(keys: &[SigningKey], token: &str, validation: &Validation) -> Result<IdentityClaims> {
    let mut last_err: Option<Error> = None;

    for key in keys {
        let decoding_key = match key.decoding_key() {
            Ok(k) => k,
            Err(err) => {
                last_err = Some(err);
                continue;
            }
        };
        match decode::<IdentityClaims>(token, &decoding_key, validation) {
            Ok(data) => return Ok(data.claims),
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        Error::Jwt(jsonwebtoken::errors::ErrorKind::InvalidToken.into())
    }))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, SystemTime, UNIX_EPOCH},
    };

    use async_trait::async_trait;
    use jsonwebtoken::{EncodingKey, encode};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        idp::{IdentityProvider, Jwk, JwksResponse, TokenData},
        store::{InMemoryTtlStore, TtlRepository},
    };

    struct CountingJwks {
        keys: Vec<Jwk>,
        fetches: AtomicUsize,
    }

    impl CountingJwks {
        fn new(raw: &[&str]) -> Self {
            Self {
                keys: raw.iter().map(|r| serde_json::from_str(r).unwrap()).collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for CountingJwks {
        async fn exchange_code(&self, _auth_code: &str, _state: &str) -> Result<TokenData> {
            Err(Error::Internal("not under test".to_string()))
        }

        async fn fetch_jwks(&self) -> Result<JwksResponse> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(JwksResponse {
                keys: self.keys.clone(),
            })
        }
    }

    const JWK_A: &str = include_str!("../../tests/fixtures/rsa_a.jwk.json");
    const JWK_B: &str = include_str!("../../tests/fixtures/rsa_b.jwk.json");
    const JWK_C: &str = include_str!("../../tests/fixtures/rsa_c.jwk.json");

    fn validator(idp: Arc<CountingJwks>) -> (JwtValidator, SigningKeyCache) {
        let store = Arc::new(InMemoryTtlStore::new());
        let repo = || {
            TtlRepository::new(
                Arc::clone(&store) as Arc<dyn crate::store::TtlStore>,
                "signing-keys",
                Duration::from_secs(60),
            )
        };
        (
            JwtValidator::new(SigningKeyCache::new(repo(), Arc::clone(&idp) as _)),
            SigningKeyCache::new(repo(), idp as _),
        )
    }

    fn sign(pem: &[u8], kid: &str, claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, &claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
    }

    fn identity_claims(nonce: &str) -> serde_json::Value {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 300;
        json!({
            "name": "Mario",
            "familyName": "Rossi",
            "fiscalNumber": "RSSMRA80A01H501U",
            "nonce": nonce,
            "exp": exp,
        })
    }

    #[tokio::test]
    async fn cold_cache_fetches_keys_once_and_verifies() {
        // GIVEN: an empty key cache and a token signed with a published key
        let idp = Arc::new(CountingJwks::new(&[JWK_A, JWK_B]));
        let (validator, _) = validator(Arc::clone(&idp));
        let token = sign(
            include_bytes!("../../tests/fixtures/rsa_a.pem"),
            "key-a",
            identity_claims("n-1"),
        );

        // WHEN: the token is validated
        let claims = validator.validate_and_parse(&token).await.unwrap();

        // THEN: one JWKS fetch, claims extracted
        assert_eq!(idp.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(claims.nonce.as_deref(), Some("n-1"));
        assert_eq!(claims.fiscal_number.as_deref(), Some("RSSMRA80A01H501U"));
    }

    #[tokio::test]
    async fn cold_cache_verifies_against_any_key_of_the_set() {
        // GIVEN: a three-key JWKS, simulating mid-rotation
        for (pem, kid) in [
            (&include_bytes!("../../tests/fixtures/rsa_b.pem")[..], "key-b"),
            (&include_bytes!("../../tests/fixtures/rsa_c.pem")[..], "key-c"),
        ] {
            let idp = Arc::new(CountingJwks::new(&[JWK_A, JWK_B, JWK_C]));
            let (validator, cache) = validator(Arc::clone(&idp));

            // WHEN: a cold cache sees a token signed by a non-first key
            let token = sign(pem, kid, identity_claims("n-5"));
            let claims = validator.validate_and_parse(&token).await.unwrap();

            // THEN: one fetch, all three keys cached, claims extracted
            assert_eq!(claims.nonce.as_deref(), Some("n-5"), "signer {kid}");
            assert_eq!(idp.fetches.load(Ordering::SeqCst), 1, "signer {kid}");
            assert_eq!(cache.cached().await.unwrap().len(), 3, "signer {kid}");
        }
    }

    #[tokio::test]
    async fn warm_cache_skips_the_fetch() {
        // GIVEN: keys already cached from an earlier refresh
        let idp = Arc::new(CountingJwks::new(&[JWK_A, JWK_B]));
        let (validator, cache) = validator(Arc::clone(&idp));
        cache.refresh().await.unwrap();
        assert_eq!(idp.fetches.load(Ordering::SeqCst), 1);

        let token = sign(
            include_bytes!("../../tests/fixtures/rsa_b.pem"),
            "key-b",
            identity_claims("n-2"),
        );

        // WHEN: a token signed by a cached key is validated
        validator.validate_and_parse(&token).await.unwrap();

        // THEN: no additional fetch happened
        assert_eq!(idp.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_signer_purges_the_cache_and_fails() {
        // GIVEN: a token signed by a key the provider does not publish
        let idp = Arc::new(CountingJwks::new(&[JWK_A, JWK_B]));
        let (validator, cache) = validator(Arc::clone(&idp));
        let token = sign(
            include_bytes!("../../tests/fixtures/rsa_c.pem"),
            "key-c",
            identity_claims("n-3"),
        );

        // WHEN: validation runs its full cached/refresh/purge chain
        let err = validator.validate_and_parse(&token).await.expect_err("rogue signer");

        // THEN: the failure is a JWT error and the cache ends up empty
        assert!(matches!(err, Error::Jwt(_)));
        assert_eq!(idp.fetches.load(Ordering::SeqCst), 1);
        assert!(cache.cached().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_token_beyond_leeway_is_rejected() {
        let idp = Arc::new(CountingJwks::new(&[JWK_A]));
        let (validator, _) = validator(idp);

        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            - 2 * LEEWAY_SECS;
        let token = sign(
            include_bytes!("../../tests/fixtures/rsa_a.pem"),
            "key-a",
            json!({"nonce": "n", "exp": exp}),
        );

        let err = validator.validate_and_parse(&token).await.expect_err("expired");
        assert!(matches!(err, Error::Jwt(_)));
    }

    #[tokio::test]
    async fn token_without_exp_is_accepted() {
        // GIVEN: a signed token carrying no expiry claim
        let idp = Arc::new(CountingJwks::new(&[JWK_A]));
        let (validator, _) = validator(idp);
        let token = sign(
            include_bytes!("../../tests/fixtures/rsa_a.pem"),
            "key-a",
            json!({"name": "Mario", "nonce": "n-4"}),
        );

        // THEN: signature alone is sufficient
        let claims = validator.validate_and_parse(&token).await.unwrap();
        assert_eq!(claims.name.as_deref(), Some("Mario"));
    }

    #[tokio::test]
    async fn garbage_token_fails_at_header_decode() {
        let idp = Arc::new(CountingJwks::new(&[JWK_A]));
        let (validator, _) = validator(Arc::clone(&idp));

        let err = validator
            .validate_and_parse("not-a-jwt")
            .await
            .expect_err("malformed token");

        assert!(matches!(err, Error::Jwt(_)));
        // Header decode failed before any key lookup
        assert_eq!(idp.fetches.load(Ordering::SeqCst), 0);
    }
}
