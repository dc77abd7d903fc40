//! OIDC Auth Gateway Library
//!
//! A relying-party gateway in front of an OIDC identity provider:
//!
//! - **Login orchestration**: builds the authorization redirect with fresh
//!   state/nonce values, recorded server-side with a TTL
//! - **Code exchange**: trades the callback's authorization code for an
//!   identity token, verifies its signature and nonce, and mints an opaque
//!   session token
//! - **Self-healing key cache**: provider signing keys are cached, refreshed
//!   on miss, and purged when nothing verifies
//! - **Session surface**: validate, whoami, and idempotent logout

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod idp;
pub mod oidc;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
