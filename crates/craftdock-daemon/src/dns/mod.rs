//! DNS registry integration.
//!
//! Registers and removes instance subdomains through the Cloudflare API.
//! Both operations are idempotent and report plain success/failure; errors
//! are logged here and never propagate to the lifecycle paths.

mod client;

pub use client::{CloudflareClient, CloudflareConfig, DnsError, DnsRegistry};
