//! Mojang profile lookup client.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Sentinel identity reference returned when the directory lookup fails.
///
/// Callers treat this as a valid-but-unresolved identity, not as an error
/// signal; the undashed-UUID shape keeps downstream consumers happy.
pub const UNRESOLVED_IDENTITY: &str = "00000000000000000000000000000000";

/// Lookup timeout; the resolver sits on the approval path, so a slow
/// directory must not stall the operator.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity resolver client errors (construction only; lookups degrade to
/// the sentinel instead of failing).
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Resolves an owner display name to a canonical identity reference.
#[tonic::async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve `owner_name`. Infallible by contract: any lookup failure
    /// yields [`UNRESOLVED_IDENTITY`].
    async fn resolve(&self, owner_name: &str) -> String;
}

/// Configuration for the Mojang profile directory.
#[derive(Debug, Clone)]
pub struct MojangConfig {
    /// Directory base URL (e.g. "<https://api.mojang.com>").
    pub base_url: String,
}

/// Mojang profile API client.
#[derive(Debug)]
pub struct MojangClient {
    http: reqwest::Client,
    base_url: String,
}

/// Profile response (subset of fields).
#[derive(Debug, Deserialize)]
struct Profile {
    /// Undashed UUID.
    id: String,
}

impl MojangClient {
    /// Create a new profile directory client.
    pub fn new(config: &MojangConfig) -> Result<Self, IdentityError> {
        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed — safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self { http, base_url })
    }
}

#[tonic::async_trait]
impl IdentityResolver for MojangClient {
    async fn resolve(&self, owner_name: &str) -> String {
        let url = format!("{}/users/profiles/minecraft/{owner_name}", self.base_url);

        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Profile>().await {
                Ok(profile) => profile.id,
                Err(e) => {
                    warn!(owner_name, error = %e, "Identity lookup returned malformed profile");
                    UNRESOLVED_IDENTITY.to_string()
                }
            },
            Ok(resp) => {
                warn!(
                    owner_name,
                    status = resp.status().as_u16(),
                    "Identity lookup returned non-success status"
                );
                UNRESOLVED_IDENTITY.to_string()
            }
            Err(e) => {
                warn!(owner_name, error = %e, "Identity lookup failed");
                UNRESOLVED_IDENTITY.to_string()
            }
        }
    }
}
