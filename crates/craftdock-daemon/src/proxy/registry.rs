//! Velocity routing-table registry.
//!
//! Velocity keeps its backend servers in `[servers]` and its host-based
//! routing in `[forced-hosts]` inside `velocity.toml`. Adding a route
//! registers the backend under its canonical name and forces the public
//! `name.base_domain` host onto it; removal drops both entries. After every
//! write the reload command is run so the proxy re-reads the table (for a
//! remote proxy, configure it as an ssh invocation).

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

/// Routing-table errors.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Routing table parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Routing table serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Routing table entry '{0}' has an unexpected shape")]
    Malformed(String),

    #[error("Proxy reload failed: {0}")]
    Reload(String),
}

/// Registers and removes proxy routes for instances.
#[tonic::async_trait]
pub trait RouteRegistry: Send + Sync {
    /// Map `name` (and its public forced host) to `addr` (`ip:port`) and
    /// reload the proxy.
    async fn add_route(&self, name: &str, addr: &str) -> Result<(), RouteError>;

    /// Drop the route and forced host for `name` and reload the proxy.
    async fn remove_route(&self, name: &str) -> Result<(), RouteError>;
}

/// Configuration for the Velocity routing table.
#[derive(Debug, Clone)]
pub struct VelocityConfig {
    /// Path to `velocity.toml` (local, or a mounted remote filesystem).
    pub table_path: PathBuf,
    /// Public base domain used for forced hosts.
    pub base_domain: String,
    /// Shell command that makes the proxy re-read its configuration
    /// (e.g. `pkill -SIGHUP -f velocity.jar`).
    pub reload_command: String,
}

/// Velocity routing-table registry.
#[derive(Debug)]
pub struct VelocityRegistry {
    table_path: PathBuf,
    base_domain: String,
    reload_command: String,
}

impl VelocityRegistry {
    /// Create a new registry over the given routing table.
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            table_path: config.table_path,
            base_domain: config.base_domain,
            reload_command: config.reload_command,
        }
    }

    async fn load_table(&self) -> Result<toml::Table, RouteError> {
        let raw = tokio::fs::read_to_string(&self.table_path).await?;
        Ok(raw.parse::<toml::Table>()?)
    }

    async fn store_table(&self, table: &toml::Table) -> Result<(), RouteError> {
        let raw = toml::to_string(table)?;
        tokio::fs::write(&self.table_path, raw).await?;
        Ok(())
    }

    /// Run the reload command so the proxy re-reads the table.
    async fn reload(&self) -> Result<(), RouteError> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.reload_command)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RouteError::Reload(stderr));
        }

        debug!(command = %self.reload_command, "Proxy reload triggered");
        Ok(())
    }

    fn forced_host(&self, name: &str) -> String {
        format!("{name}.{}", self.base_domain)
    }
}

#[tonic::async_trait]
impl RouteRegistry for VelocityRegistry {
    async fn add_route(&self, name: &str, addr: &str) -> Result<(), RouteError> {
        let mut table = self.load_table().await?;

        let servers = table
            .entry("servers")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        servers
            .as_table_mut()
            .ok_or_else(|| RouteError::Malformed("servers".into()))?
            .insert(name.to_string(), toml::Value::String(addr.to_string()));

        let hosts = table
            .entry("forced-hosts")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        hosts
            .as_table_mut()
            .ok_or_else(|| RouteError::Malformed("forced-hosts".into()))?
            .insert(
                self.forced_host(name),
                toml::Value::Array(vec![toml::Value::String(name.to_string())]),
            );

        self.store_table(&table).await?;
        self.reload().await?;

        info!(name, addr, "Proxy route added");
        Ok(())
    }

    async fn remove_route(&self, name: &str) -> Result<(), RouteError> {
        let mut table = self.load_table().await?;

        if let Some(servers) = table.get_mut("servers").and_then(toml::Value::as_table_mut) {
            servers.remove(name);
        }
        let forced = self.forced_host(name);
        if let Some(hosts) = table
            .get_mut("forced-hosts")
            .and_then(toml::Value::as_table_mut)
        {
            hosts.remove(&forced);
        }

        self.store_table(&table).await?;
        self.reload().await?;

        info!(name, "Proxy route removed");
        Ok(())
    }
}
