//! Durable deferred-notification scheduler.
//!
//! Approval enqueues a `notification_jobs` row instead of arming an
//! in-memory timer; this loop polls for due jobs, sends them, and marks
//! them `sent` or `failed`. Because the job is a row, a daemon restart
//! resumes unsent notifications instead of dropping them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use craftdock_core::db::unix_timestamp;

use crate::notify::Notifier;
use crate::storage::Database;

/// Spawn the notification scheduler loop.
pub fn spawn_notification_scheduler(
    db: Database,
    notifier: Arc<dyn Notifier>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    process_due(&db, notifier.as_ref()).await;
                }
                _ = shutdown.changed() => {
                    info!("Notification scheduler shutting down");
                    return;
                }
            }
        }
    })
}

/// Send every job that has come due and record the result.
///
/// Each job is settled (`sent` or `failed`) after its send attempt, so a
/// job goes out at most once; failures are not retried.
pub(crate) async fn process_due(db: &Database, notifier: &dyn Notifier) {
    let due = match db.due_notifications(unix_timestamp()).await {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "Failed to fetch due notifications");
            return;
        }
    };

    for job in due {
        match notifier.send(&job.recipient, &job.subject, &job.body).await {
            Ok(()) => {
                info!(job_id = job.id, request_id = job.request_id, "Deferred notification sent");
                if let Err(e) = db.mark_notification_sent(job.id).await {
                    warn!(job_id = job.id, error = %e, "Failed to mark notification sent");
                }
            }
            Err(e) => {
                warn!(job_id = job.id, request_id = job.request_id, error = %e, "Deferred notification failed");
                if let Err(e) = db.mark_notification_failed(job.id).await {
                    warn!(job_id = job.id, error = %e, "Failed to mark notification failed");
                }
            }
        }
    }
}
