//! Compute provisioning integration.
//!
//! Provides a reqwest-based client for the Proxmox VE REST API, covering
//! instance creation (clone template, configure, start) and teardown.

mod client;
pub mod types;

pub use client::{ProvisionError, Provisioner, ProxmoxClient, ProxmoxConfig};
pub use types::InstanceParams;
