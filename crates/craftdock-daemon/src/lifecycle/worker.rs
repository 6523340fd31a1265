//! Supervised background provisioning.
//!
//! Approval hands provisioning to this worker instead of firing a detached
//! task: jobs queue on a bounded channel, run one at a time, and every
//! outcome lands back on the request row (`active`, or `failed` with the
//! error recorded), so nothing disappears with the task.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::provision::{InstanceParams, Provisioner};
use crate::storage::{Database, RequestStatus};

/// Queued provisioning work for one approved request.
#[derive(Debug, Clone)]
pub struct ProvisionJob {
    pub request_id: i64,
    pub vmid: i64,
    pub template: i64,
    pub params: InstanceParams,
}

/// Jobs waiting behind a slow provisioner; approvals beyond this block
/// until a slot frees up.
const JOB_QUEUE_CAPACITY: usize = 32;

/// Spawn the provision worker.
///
/// Returns the job sender and the task handle. The task drains the queue
/// until the sender side is dropped or the shutdown signal fires.
pub fn spawn_provision_worker(
    db: Database,
    provisioner: Arc<dyn Provisioner>,
    mut shutdown: watch::Receiver<bool>,
) -> (mpsc::Sender<ProvisionJob>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ProvisionJob>(JOB_QUEUE_CAPACITY);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                job = rx.recv() => {
                    let Some(job) = job else {
                        info!("Provision queue closed");
                        return;
                    };
                    run_job(&db, provisioner.as_ref(), job).await;
                }
                _ = shutdown.changed() => {
                    info!("Provision worker shutting down");
                    return;
                }
            }
        }
    });

    (tx, handle)
}

/// Run one job and persist its outcome on the request row.
async fn run_job(db: &Database, provisioner: &dyn Provisioner, job: ProvisionJob) {
    info!(
        request_id = job.request_id,
        vmid = job.vmid,
        name = %job.params.instance_name,
        "Provisioning instance"
    );

    match provisioner.create(job.vmid, job.template, &job.params).await {
        Ok(()) => {
            info!(request_id = job.request_id, "Provisioning succeeded");
            if let Err(e) = db
                .update_request_status(job.request_id, RequestStatus::Active, None)
                .await
            {
                warn!(request_id = job.request_id, error = %e, "Failed to record provisioning success");
            }
        }
        Err(e) => {
            warn!(request_id = job.request_id, error = %e, "Provisioning failed");
            let note = e.to_string();
            if let Err(e) = db
                .update_request_status(job.request_id, RequestStatus::Failed, Some(&note))
                .await
            {
                warn!(request_id = job.request_id, error = %e, "Failed to record provisioning failure");
            }
        }
    }
}
