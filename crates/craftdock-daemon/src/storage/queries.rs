//! Database queries for the craftdock daemon.

use craftdock_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{NewRequest, NotificationJob, RequestStatus, ServerRequest};

impl Database {
    // =========================================================================
    // Request queries
    // =========================================================================

    /// Insert a new pending request and return the stored row.
    ///
    /// Server name uniqueness (case-insensitive) is enforced by the unique
    /// index in one atomic statement; a violation surfaces as
    /// [`DatabaseError::Conflict`] and nothing is written.
    pub async fn insert_request(&self, draft: &NewRequest) -> Result<ServerRequest, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            r"
            INSERT INTO requests
                (email, servername, seed, gamemode, difficulty, whitelist_enabled,
                 owner_name, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&draft.email)
        .bind(&draft.servername)
        .bind(&draft.seed)
        .bind(&draft.gamemode)
        .bind(&draft.difficulty)
        .bind(i64::from(draft.whitelist_enabled))
        .bind(&draft.owner_name)
        .bind(RequestStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_request(result.last_insert_rowid()).await
    }

    /// Get a request by id.
    pub async fn get_request(&self, id: i64) -> Result<ServerRequest, DatabaseError> {
        sqlx::query_as::<_, ServerRequest>("SELECT * FROM requests WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Request {id}")))
    }

    /// List requests, optionally filtered by status, oldest first.
    pub async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServerRequest>, DatabaseError> {
        let requests = if let Some(status) = status {
            sqlx::query_as::<_, ServerRequest>(
                "SELECT * FROM requests WHERE status = ? ORDER BY created_at ASC, id ASC",
            )
            .bind(status.as_str())
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, ServerRequest>(
                "SELECT * FROM requests ORDER BY created_at ASC, id ASC",
            )
            .fetch_all(self.pool())
            .await?
        };

        Ok(requests)
    }

    /// Persist the approval outcome on a row: the derived address, the
    /// re-normalized fields, the resolved identity, and status
    /// `provisioning`.
    pub async fn update_approved(
        &self,
        id: i64,
        ip: &str,
        seed: &str,
        gamemode: &str,
        difficulty: &str,
        identity_ref: &str,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            UPDATE requests
            SET ip = ?,
                seed = ?,
                gamemode = ?,
                difficulty = ?,
                identity_ref = ?,
                status = ?,
                updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(ip)
        .bind(seed)
        .bind(gamemode)
        .bind(difficulty)
        .bind(identity_ref)
        .bind(RequestStatus::Provisioning.as_str())
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Update a request's status, optionally recording a failure note.
    ///
    /// When `last_error` is `None` the existing note is left untouched.
    pub async fn update_request_status(
        &self,
        id: i64,
        status: RequestStatus,
        last_error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        if let Some(err) = last_error {
            sqlx::query("UPDATE requests SET status = ?, last_error = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(err)
                .bind(now)
                .bind(id)
                .execute(self.pool())
                .await?;
        } else {
            sqlx::query("UPDATE requests SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(self.pool())
                .await?;
        }

        Ok(())
    }

    /// Record an adapter failure note on a row without changing its status.
    pub async fn record_request_error(&self, id: i64, note: &str) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("UPDATE requests SET last_error = ?, updated_at = ? WHERE id = ?")
            .bind(note)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Delete a request row.
    ///
    /// Returns `true` if a row was deleted, `false` if the id was not found.
    pub async fn delete_request(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM requests WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Notification job queries
    // =========================================================================

    /// Enqueue a deferred notification due at the given unix time.
    pub async fn enqueue_notification(
        &self,
        request_id: i64,
        recipient: &str,
        subject: &str,
        body: &str,
        due_at: i64,
    ) -> Result<i64, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            r"
            INSERT INTO notification_jobs
                (request_id, recipient, subject, body, due_at, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            ",
        )
        .bind(request_id)
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .bind(due_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch pending notification jobs whose due time has passed,
    /// oldest-due first.
    pub async fn due_notifications(&self, now: i64) -> Result<Vec<NotificationJob>, DatabaseError> {
        let jobs = sqlx::query_as::<_, NotificationJob>(
            "SELECT * FROM notification_jobs WHERE status = 'pending' AND due_at <= ? ORDER BY due_at ASC, id ASC",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        Ok(jobs)
    }

    /// Mark a notification job as sent.
    pub async fn mark_notification_sent(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE notification_jobs SET status = 'sent' WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Mark a notification job as failed.
    pub async fn mark_notification_failed(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE notification_jobs SET status = 'failed' WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
