//! Provisioning parameter types.

use serde::{Deserialize, Serialize};

/// Parameters describing the instance to bootstrap inside a fresh container.
///
/// Serialized into the container description; the in-guest bootstrap reads
/// them on first start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceParams {
    /// Sanitized world seed (alphanumeric, possibly empty).
    pub seed: String,
    /// Canonical instance name (prefix + server name), also the hostname.
    pub instance_name: String,
    /// Normalized gamemode (lowercase letters).
    pub gamemode: String,
    /// Normalized difficulty (lowercase letters).
    pub difficulty: String,
    pub whitelist_enabled: bool,
    /// Owner display name.
    pub owner_name: String,
    /// Resolved owner identity (or the unresolved sentinel).
    pub identity_ref: String,
}
