//! # Invitekit Supabase
//!
//! Production implementations of the invitekit seam traits against a hosted
//! Supabase project: GoTrue (`/auth/v1`) is the identity provider and
//! PostgREST (`/rest/v1`) is the client-record store. All access uses the
//! privileged service-role key; the only caller-scoped call is the token
//! introspection, which forwards the coach's own bearer token.

#![warn(missing_docs)]

use thiserror::Error;

/// GoTrue token introspection and admin account management.
pub mod gotrue;

/// PostgREST access to the `clients` table.
pub mod postgrest;

pub use gotrue::GoTrueAdmin;
pub use postgrest::PostgrestClientStore;

/// Environment variable holding the Supabase project base URL.
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";

/// Environment variable holding the privileged service-role key.
pub const ENV_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// A required configuration value is absent or blank.
#[derive(Debug, Error)]
#[error("missing required environment variable {0}")]
pub struct MissingConfig(pub &'static str);

/// Connection settings for the Supabase project.
///
/// Constructed once at startup and injected into the adapters, so tests can
/// point them at whatever they like instead of reading process state.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    base_url: String,
    service_role_key: String,
}

impl SupabaseConfig {
    /// Build a config from explicit values. A trailing slash on the base
    /// URL is stripped.
    pub fn new(base_url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            service_role_key: service_role_key.into(),
        }
    }

    /// Read the config from the process environment.
    ///
    /// Both variables are required; a missing or blank value is a fatal
    /// configuration error for the server.
    pub fn from_env() -> Result<Self, MissingConfig> {
        let base_url = required_env(ENV_SUPABASE_URL)?;
        let service_role_key = required_env(ENV_SERVICE_ROLE_KEY)?;
        Ok(Self::new(base_url, service_role_key))
    }

    /// URL of a GoTrue endpoint under `{base}/auth/v1/`.
    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// URL of a PostgREST endpoint under `{base}/rest/v1/`.
    pub(crate) fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    pub(crate) fn service_role_key(&self) -> &str {
        &self.service_role_key
    }
}

fn required_env(name: &'static str) -> Result<String, MissingConfig> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MissingConfig(name)),
    }
}
