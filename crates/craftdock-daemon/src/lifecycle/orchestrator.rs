//! The request lifecycle state machine.
//!
//! `pending` rows are created by `submit` and leave the store through
//! `deny`/`decommission`; `approve` advances a row to `provisioning` and
//! fans out to the external systems: the provision worker (background),
//! DNS and the proxy routing table (on the calling path), and the deferred
//! requester notification (durable job). The provision worker later settles
//! the row to `active` or `failed`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use craftdock_core::db::unix_timestamp;
use craftdock_core::{AllocError, Allocator, ValidationError, normalize_enum, sanitize, validate};

use crate::dns::DnsRegistry;
use crate::identity::IdentityResolver;
use crate::notify::Notifier;
use crate::provision::{InstanceParams, Provisioner};
use crate::proxy::RouteRegistry;
use crate::storage::{Database, DatabaseError, NewRequest, RequestStatus, ServerRequest};

use super::worker::ProvisionJob;

/// Errors from the lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("the name '{0}' is already being used in another world")]
    NameConflict(String),

    #[error("request {0} not found")]
    NotFound(i64),

    #[error("request {id} is not awaiting a decision (status: {status})")]
    InvalidState { id: i64, status: String },

    #[error("resource allocation failed: {0}")]
    Allocation(#[from] AllocError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Settings for the lifecycle orchestrator.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Public base domain instances are exposed under.
    pub base_domain: String,
    /// Prefix of the canonical instance name (default "mc-").
    pub name_prefix: String,
    /// Template the provisioner clones for new instances.
    pub template_id: i64,
    /// Port every instance listens on behind the proxy.
    pub game_port: u16,
    /// Delay before the "approved/live" email goes out.
    pub notify_delay_secs: i64,
    /// Recipient of new-request notifications.
    pub operator_email: String,
}

impl LifecycleConfig {
    /// Canonical instance name derived from a sanitized server name.
    pub fn canonical_name(&self, servername: &str) -> String {
        format!("{}{servername}", self.name_prefix)
    }

    /// Public address players connect to.
    pub fn public_address(&self, canonical: &str) -> String {
        format!("{canonical}.{}", self.base_domain)
    }
}

/// A request draft as received from the requester, pre-sanitization.
#[derive(Debug, Clone)]
pub struct RequestDraft {
    pub email: String,
    pub servername: String,
    pub seed: String,
    pub gamemode: String,
    pub difficulty: String,
    pub whitelist_enabled: bool,
    pub owner_name: String,
}

/// Drives request state transitions and coordinates the external systems.
///
/// Adapters are injected so tests can substitute doubles; the orchestrator
/// itself holds no per-request state beyond what the store records.
pub struct Orchestrator {
    db: Database,
    allocator: Allocator,
    config: LifecycleConfig,
    provisioner: Arc<dyn Provisioner>,
    dns: Arc<dyn DnsRegistry>,
    routes: Arc<dyn RouteRegistry>,
    notifier: Arc<dyn Notifier>,
    identity: Arc<dyn IdentityResolver>,
    provision_tx: mpsc::Sender<ProvisionJob>,
}

impl Orchestrator {
    /// Create a new orchestrator with all collaborators wired in.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        allocator: Allocator,
        config: LifecycleConfig,
        provisioner: Arc<dyn Provisioner>,
        dns: Arc<dyn DnsRegistry>,
        routes: Arc<dyn RouteRegistry>,
        notifier: Arc<dyn Notifier>,
        identity: Arc<dyn IdentityResolver>,
        provision_tx: mpsc::Sender<ProvisionJob>,
    ) -> Self {
        Self {
            db,
            allocator,
            config,
            provisioner,
            dns,
            routes,
            notifier,
            identity,
            provision_tx,
        }
    }

    /// Validate, sanitize, and store a new request as `pending`, then tell
    /// the operator about it.
    ///
    /// On `Validation` or `NameConflict` nothing is written and no
    /// notification goes out.
    pub async fn submit(&self, draft: RequestDraft) -> Result<ServerRequest, LifecycleError> {
        let email = draft.email.trim().to_string();
        let raw_name = draft.servername.trim();
        validate::validate_submission(&email, raw_name)?;

        let new_request = NewRequest {
            email,
            servername: sanitize(raw_name),
            seed: sanitize(draft.seed.trim()),
            gamemode: draft.gamemode,
            difficulty: draft.difficulty,
            whitelist_enabled: draft.whitelist_enabled,
            owner_name: sanitize(&draft.owner_name),
        };

        let row = self
            .db
            .insert_request(&new_request)
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => {
                    LifecycleError::NameConflict(new_request.servername.clone())
                }
                other => LifecycleError::Database(other),
            })?;

        info!(id = row.id, servername = %row.servername, "Request submitted");

        let body = format!(
            "New request #{}: {}, {}, {}, {}, {}",
            row.id, row.email, row.servername, row.gamemode, row.seed, row.difficulty
        );
        if let Err(e) = self
            .notifier
            .send(&self.config.operator_email, "New server request", &body)
            .await
        {
            warn!(id = row.id, error = %e, "Operator notification failed");
        }

        Ok(row)
    }

    /// Approve a pending request: derive its resources, persist the updated
    /// row, and fan out to the external systems.
    pub async fn approve(&self, id: i64) -> Result<ServerRequest, LifecycleError> {
        let row = self.load(id).await?;
        Self::require_pending(&row)?;

        let allocation = self.allocator.allocate(row.id)?;
        let ip = allocation.ip.to_string();

        let clean_seed = sanitize(&row.seed);
        let raw_mode = if row.gamemode.is_empty() {
            "survival"
        } else {
            row.gamemode.as_str()
        };
        let raw_diff = if row.difficulty.is_empty() {
            "hard"
        } else {
            row.difficulty.as_str()
        };
        let gamemode = normalize_enum(raw_mode);
        let difficulty = normalize_enum(raw_diff);

        let identity_ref = self.identity.resolve(&row.owner_name).await;
        let canonical = self.config.canonical_name(&row.servername);

        // Make the row consistent before any side effect launches: a reader
        // observing `provisioning` always sees the derived fields with it.
        self.db
            .update_approved(id, &ip, &clean_seed, &gamemode, &difficulty, &identity_ref)
            .await?;

        // Background provisioning through the supervised worker; the worker
        // settles the row to active/failed.
        let job = ProvisionJob {
            request_id: id,
            vmid: allocation.vmid,
            template: self.config.template_id,
            params: InstanceParams {
                seed: clean_seed,
                instance_name: canonical.clone(),
                gamemode,
                difficulty,
                whitelist_enabled: row.whitelist(),
                owner_name: row.owner_name.clone(),
                identity_ref,
            },
        };
        if self.provision_tx.send(job).await.is_err() {
            warn!(id, "Provision worker unavailable");
            self.db
                .update_request_status(id, RequestStatus::Failed, Some("provision worker unavailable"))
                .await?;
        } else {
            info!(id, vmid = allocation.vmid, "Provisioning dispatched");
        }

        // Register the public name on the calling path. Failures are logged
        // and recorded; the remaining steps still run.
        if !self.dns.create_subdomain(&canonical).await {
            self.db
                .record_request_error(id, "dns registration failed")
                .await?;
        }
        let addr = format!("{ip}:{}", self.config.game_port);
        if let Err(e) = self.routes.add_route(&canonical, &addr).await {
            warn!(id, error = %e, "Proxy route registration failed");
            self.db
                .record_request_error(id, "proxy route registration failed")
                .await?;
        }

        // Durable deferred notification, sent after the configured delay
        // whatever provisioning does in the meantime.
        let due_at = unix_timestamp() + self.config.notify_delay_secs;
        let body = format!(
            "Your server request has been approved and is coming online now!\n\
             Connect using address: {}\n",
            self.config.public_address(&canonical)
        );
        self.db
            .enqueue_notification(
                id,
                &row.email,
                "Your server request has been approved!",
                &body,
                due_at,
            )
            .await?;

        Ok(self.db.get_request(id).await?)
    }

    /// Deny a pending request: notify the requester and remove the row.
    ///
    /// Nothing was provisioned for a pending request, so no compute, DNS,
    /// or proxy calls are made.
    pub async fn deny(&self, id: i64) -> Result<(), LifecycleError> {
        let row = self.load(id).await?;
        Self::require_pending(&row)?;

        if let Err(e) = self
            .notifier
            .send(
                &row.email,
                "Server request denied",
                "Your server request has been denied.",
            )
            .await
        {
            warn!(id, error = %e, "Denial notification failed");
        }

        self.db.delete_request(id).await?;
        info!(id, servername = %row.servername, "Request denied and removed");
        Ok(())
    }

    /// Tear an instance down and remove its request.
    ///
    /// Fixed order: destroy compute, remove DNS, remove the proxy route,
    /// notify the requester, delete the row. Every step is attempted even
    /// when an earlier one fails; no compensation.
    pub async fn decommission(&self, id: i64) -> Result<(), LifecycleError> {
        let row = self.load(id).await?;
        let canonical = self.config.canonical_name(&row.servername);

        if let Err(e) = self.provisioner.destroy(id).await {
            warn!(id, error = %e, "Instance destroy failed");
        }
        if !self.dns.remove_subdomain(&canonical).await {
            warn!(id, name = %canonical, "DNS removal reported failure");
        }
        if let Err(e) = self.routes.remove_route(&canonical).await {
            warn!(id, error = %e, "Proxy route removal failed");
        }
        if let Err(e) = self
            .notifier
            .send(
                &row.email,
                "Server deleted",
                &format!("Your server '{canonical}' has been deleted."),
            )
            .await
        {
            warn!(id, error = %e, "Deletion notification failed");
        }

        self.db.delete_request(id).await?;
        info!(id, servername = %row.servername, "Request decommissioned and removed");
        Ok(())
    }

    /// Requests waiting for an operator decision, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<ServerRequest>, LifecycleError> {
        Ok(self.db.list_requests(Some(RequestStatus::Pending)).await?)
    }

    async fn load(&self, id: i64) -> Result<ServerRequest, LifecycleError> {
        self.db.get_request(id).await.map_err(|e| match e {
            DatabaseError::NotFound(_) => LifecycleError::NotFound(id),
            other => LifecycleError::Database(other),
        })
    }

    fn require_pending(row: &ServerRequest) -> Result<(), LifecycleError> {
        if row.status == RequestStatus::Pending.as_str() {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                id: row.id,
                status: row.status.clone(),
            })
        }
    }
}
