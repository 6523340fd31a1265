//! Proxmox VE REST API client.
//!
//! Instance creation clones an LXC template to the allocated VMID, writes
//! the instance parameters into the container config, and starts it.
//! Teardown stops and deletes the container.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::{debug, info};

use super::types::InstanceParams;

/// Provisioner client errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provisioner API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Creates and destroys compute instances addressed by VMID.
#[tonic::async_trait]
pub trait Provisioner: Send + Sync {
    /// Clone `template` to a new instance with id `vmid` and start it.
    async fn create(
        &self,
        vmid: i64,
        template: i64,
        params: &InstanceParams,
    ) -> Result<(), ProvisionError>;

    /// Stop and delete the instance with id `vmid`.
    async fn destroy(&self, vmid: i64) -> Result<(), ProvisionError>;
}

/// Configuration for connecting to a Proxmox VE host.
#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    /// API base URL (e.g. "<https://pve.internal:8006>").
    pub base_url: String,
    /// API token id (`user@realm!tokenid`).
    pub token_id: String,
    /// API token secret.
    pub token_secret: String,
    /// Node hosting the containers.
    pub node: String,
    /// Accept the host's self-signed TLS certificate.
    pub accept_invalid_certs: bool,
}

/// Proxmox VE REST API client.
#[derive(Debug)]
pub struct ProxmoxClient {
    http: reqwest::Client,
    base_url: String,
    node: String,
}

impl ProxmoxClient {
    /// Create a new Proxmox API client.
    pub fn new(config: &ProxmoxConfig) -> Result<Self, ProvisionError> {
        if config.base_url.is_empty() {
            return Err(ProvisionError::Config("base_url is empty".into()));
        }
        if config.token_id.is_empty() || config.token_secret.is_empty() {
            return Err(ProvisionError::Config("API token is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!(
            "PVEAPIToken={}={}",
            config.token_id, config.token_secret
        ))
        .map_err(|_| ProvisionError::Config("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed — safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            node: config.node.clone(),
        })
    }

    /// Build the API URL for a container path on the configured node.
    fn lxc_url(&self, path: &str) -> String {
        format!("{}/api2/json/nodes/{}/lxc{path}", self.base_url, self.node)
    }

    /// Check HTTP response status, returning error for non-success codes.
    fn check_status(resp: &reqwest::Response) -> Result<(), ProvisionError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(ProvisionError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl Provisioner for ProxmoxClient {
    async fn create(
        &self,
        vmid: i64,
        template: i64,
        params: &InstanceParams,
    ) -> Result<(), ProvisionError> {
        // 1. Clone the template to the allocated VMID.
        let body = serde_json::json!({
            "newid": vmid,
            "hostname": params.instance_name,
            "full": true,
        });
        let resp = self
            .http
            .post(self.lxc_url(&format!("/{template}/clone")))
            .json(&body)
            .send()
            .await?;
        Self::check_status(&resp)?;
        debug!(vmid, template, "Template cloned");

        // 2. Write the instance parameters into the container description;
        //    the in-guest bootstrap reads them on first start.
        let description = serde_json::to_string(params)?;
        let body = serde_json::json!({ "description": description });
        let resp = self
            .http
            .put(self.lxc_url(&format!("/{vmid}/config")))
            .json(&body)
            .send()
            .await?;
        Self::check_status(&resp)?;

        // 3. Start the container.
        let resp = self
            .http
            .post(self.lxc_url(&format!("/{vmid}/status/start")))
            .send()
            .await?;
        Self::check_status(&resp)?;

        info!(vmid, name = %params.instance_name, "Instance created and started");
        Ok(())
    }

    async fn destroy(&self, vmid: i64) -> Result<(), ProvisionError> {
        // Stop first. An already-stopped container reports an API error
        // here; deletion below is the step that matters.
        let resp = self
            .http
            .post(self.lxc_url(&format!("/{vmid}/status/stop")))
            .send()
            .await?;
        if let Err(e) = Self::check_status(&resp) {
            debug!(vmid, error = %e, "Stop before delete reported failure");
        }

        let resp = self.http.delete(self.lxc_url(&format!("/{vmid}"))).send().await?;
        Self::check_status(&resp)?;

        info!(vmid, "Instance destroyed");
        Ok(())
    }
}
