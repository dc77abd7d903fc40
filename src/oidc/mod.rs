//! OIDC identity token verification.
//!
//! Two pieces: [`keys::SigningKeyCache`] holds the provider's RSA signing
//! keys in a TTL keyspace and knows how to refresh them from the JWKS
//! endpoint, and [`validator::JwtValidator`] verifies identity tokens against
//! the cache with a fetch-retry-purge fallback so that provider key rotation
//! heals without a restart.

pub mod keys;
pub mod validator;

pub use keys::{SigningKey, SigningKeyCache};
pub use validator::{IdentityClaims, JwtValidator};
