//! Cloudflare DNS records client.
//!
//! Uses reqwest to manage the CNAME records that expose instances under the
//! public base domain.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// DNS client errors.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DNS API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Registers and removes instance subdomains.
#[tonic::async_trait]
pub trait DnsRegistry: Send + Sync {
    /// Register `name` under the base domain. Returns `true` on success;
    /// a no-op when the record already exists.
    async fn create_subdomain(&self, name: &str) -> bool;

    /// Remove `name` from the base domain. Returns `true` on success;
    /// a no-op when no record exists.
    async fn remove_subdomain(&self, name: &str) -> bool;
}

/// Configuration for connecting to the Cloudflare API.
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    /// API base URL (e.g. "<https://api.cloudflare.com/client/v4>").
    pub api_url: String,
    /// API token scoped to DNS edits on the zone.
    pub token: String,
    /// Zone identifier of the base domain.
    pub zone_id: String,
    /// Public base domain (e.g. "example.net").
    pub base_domain: String,
    /// CNAME target all instance records point at (the dynamic-DNS name of
    /// the game network's ingress).
    pub target: String,
}

/// Cloudflare DNS records client.
#[derive(Debug)]
pub struct CloudflareClient {
    http: reqwest::Client,
    api_url: String,
    zone_id: String,
    base_domain: String,
    target: String,
}

/// DNS record reference (subset of fields).
#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
}

/// Record listing response.
#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    result: Vec<DnsRecord>,
}

impl CloudflareClient {
    /// Create a new DNS client.
    pub fn new(config: &CloudflareConfig) -> Result<Self, DnsError> {
        if config.token.is_empty() {
            return Err(DnsError::Config("token is empty".into()));
        }
        if config.zone_id.is_empty() {
            return Err(DnsError::Config("zone_id is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| DnsError::Config("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed — safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            zone_id: config.zone_id.clone(),
            base_domain: config.base_domain.clone(),
            target: config.target.clone(),
        })
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_url, self.zone_id)
    }

    /// Check HTTP response status, returning error for non-success codes.
    fn check_status(resp: &reqwest::Response) -> Result<(), DnsError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(DnsError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }
        Ok(())
    }

    /// List the record ids currently registered for a fully-qualified name.
    async fn find_record_ids(&self, full_name: &str) -> Result<Vec<String>, DnsError> {
        let url = format!("{}?name={full_name}", self.records_url());
        let resp = self.http.get(&url).send().await?;
        Self::check_status(&resp)?;
        let list: RecordList = resp.json().await?;
        Ok(list.result.into_iter().map(|r| r.id).collect())
    }

    async fn try_create(&self, name: &str, full_name: &str) -> Result<bool, DnsError> {
        if !self.find_record_ids(full_name).await?.is_empty() {
            return Ok(false);
        }

        let body = serde_json::json!({
            "type": "CNAME",
            "name": name,
            "content": self.target,
            "proxied": false,
        });
        let resp = self.http.post(self.records_url()).json(&body).send().await?;
        Self::check_status(&resp)?;
        Ok(true)
    }

    async fn try_remove(&self, full_name: &str) -> Result<bool, DnsError> {
        let ids = self.find_record_ids(full_name).await?;
        if ids.is_empty() {
            return Ok(false);
        }

        for id in ids {
            let url = format!("{}/{id}", self.records_url());
            let resp = self.http.delete(&url).send().await?;
            Self::check_status(&resp)?;
        }
        Ok(true)
    }
}

#[tonic::async_trait]
impl DnsRegistry for CloudflareClient {
    async fn create_subdomain(&self, name: &str) -> bool {
        let full_name = format!("{name}.{}", self.base_domain);

        match self.try_create(name, &full_name).await {
            Ok(true) => {
                info!(name = %full_name, "DNS record created");
                true
            }
            Ok(false) => {
                info!(name = %full_name, "DNS record already exists");
                true
            }
            Err(e) => {
                warn!(name = %full_name, error = %e, "DNS record creation failed");
                false
            }
        }
    }

    async fn remove_subdomain(&self, name: &str) -> bool {
        let full_name = format!("{name}.{}", self.base_domain);

        match self.try_remove(&full_name).await {
            Ok(true) => {
                info!(name = %full_name, "DNS record removed");
                true
            }
            Ok(false) => {
                info!(name = %full_name, "No DNS record to remove");
                true
            }
            Err(e) => {
                warn!(name = %full_name, error = %e, "DNS record removal failed");
                false
            }
        }
    }
}
