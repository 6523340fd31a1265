//! Database models for the craftdock daemon.

use serde::{Deserialize, Serialize};

/// Server request record from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServerRequest {
    pub id: i64,
    pub email: String,
    pub servername: String,
    pub seed: String,
    pub gamemode: String,
    pub difficulty: String,
    pub whitelist_enabled: i64,
    pub owner_name: String,
    /// Internal instance address; `None` until approval.
    pub ip: Option<String>,
    /// Resolved owner identity; `None` until approval.
    pub identity_ref: Option<String>,
    pub status: String,
    /// Most recent adapter or provisioning failure note.
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ServerRequest {
    /// Whether the whitelist flag is set (stored as 0/1).
    pub const fn whitelist(&self) -> bool {
        self.whitelist_enabled != 0
    }
}

/// Fields of a new request, sanitized and validated by the orchestrator
/// before insertion.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub email: String,
    pub servername: String,
    pub seed: String,
    pub gamemode: String,
    pub difficulty: String,
    pub whitelist_enabled: bool,
    pub owner_name: String,
}

/// Deferred notification job record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationJob {
    pub id: i64,
    pub request_id: i64,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub due_at: i64,
    pub status: String,
    pub created_at: i64,
}

/// Request status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Waiting for an operator decision.
    Pending,
    /// Approved; provisioning handed to the background worker.
    Provisioning,
    /// The provisioner reported success.
    Active,
    /// The provisioner reported failure; see `last_error`.
    Failed,
}

impl RequestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
