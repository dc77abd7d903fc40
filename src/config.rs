//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Identity provider configuration
    pub idp: IdpConfig,
    /// Token lifetimes and sizing
    pub tokens: TokenConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Overall per-request timeout applied at the HTTP layer
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Identity provider (IdP) configuration.
///
/// `base_url`, `redirect_uri` and `client_id` must be non-blank before a
/// login URL can be built; this is validated at login time, not load time, so
/// that a misconfigured instance can still start and report health.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// IdP base URL, e.g. `https://oauth.example.org`
    pub base_url: String,
    /// Redirect URI registered with the IdP for this client
    pub redirect_uri: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret (sent as HTTP Basic on the token endpoint)
    pub client_secret: String,
    /// Connect timeout for outbound IdP calls
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Read timeout for outbound IdP calls
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            redirect_uri: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// TTLs for the three keyspaces plus session token sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// How long an unconsumed login attempt (state/nonce pair) stays valid
    #[serde(with = "humantime_serde")]
    pub pending_login_ttl: Duration,
    /// Session lifetime after a successful exchange
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,
    /// How long fetched IdP signing keys are cached
    #[serde(with = "humantime_serde")]
    pub signing_key_ttl: Duration,
    /// Retry window during which the same authorization code returns the
    /// same session
    #[serde(with = "humantime_serde")]
    pub auth_code_ttl: Duration,
    /// Session token entropy in bytes (encoded as URL-safe base64)
    pub session_token_bytes: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            pending_login_ttl: Duration::from_secs(5 * 60),
            session_ttl: Duration::from_secs(30 * 60),
            signing_key_ttl: Duration::from_secs(10 * 60),
            auth_code_ttl: Duration::from_secs(5 * 60),
            session_token_bytes: 32,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file plus environment
    /// variables (`AUTH_GATEWAY_` prefix, `__` section separator).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Configuration(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("AUTH_GATEWAY_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))
    }
}
