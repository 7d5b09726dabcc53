//! Export job queue operations.
//!
//! The job table is the only coordination point between submitters and the
//! worker. Claiming uses a conditional update so two claimers racing for the
//! same pending row cannot both win.

use crate::error::DatabaseError;
use crate::types::{ExportJob, JobId, JobStatus};
use crate::{Error, Result};

use super::{Database, ExportJobRow, JobFilter, JobOutcome, NewExportJob};

const JOB_COLUMNS: &str = r#"
    id, user_id, channel_id, format, range_start, range_end,
    include_ooc, include_archived, without_timestamp, merge_messages,
    options, status, progress, created_at, updated_at, finished_at,
    file_path, file_name, file_size, error_message, upload_url, upload_meta
"#;

const DEFAULT_LIST_LIMIT: i64 = 100;

impl Database {
    /// Insert a new pending export job
    pub async fn insert_job(&self, job: &NewExportJob) -> Result<JobId> {
        let now = chrono::Utc::now().timestamp();
        let options = serde_json::to_string(&job.options)?;

        let result = sqlx::query(
            r#"
            INSERT INTO export_jobs (
                user_id, channel_id, format, range_start, range_end,
                include_ooc, include_archived, without_timestamp, merge_messages,
                options, status, progress, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.user_id)
        .bind(&job.channel_id)
        .bind(job.format.as_str())
        .bind(job.time_range.start)
        .bind(job.time_range.end)
        .bind(job.filters.include_ooc)
        .bind(job.filters.include_archived)
        .bind(job.filters.without_timestamp)
        .bind(job.filters.merge_messages)
        .bind(options)
        .bind(JobStatus::Pending.as_str())
        .bind(0i64) // progress
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert export job: {}",
                e
            )))
        })?;

        Ok(JobId(result.last_insert_rowid()))
    }

    /// Get an export job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<ExportJob>> {
        let row = sqlx::query_as::<_, ExportJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM export_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get export job: {}",
                e
            )))
        })?;

        row.map(ExportJob::try_from).transpose()
    }

    /// List export jobs, newest first
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<ExportJob>> {
        let mut query_builder =
            sqlx::QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM export_jobs WHERE 1 = 1"));

        if let Some(channel_id) = &filter.channel_id {
            query_builder.push(" AND channel_id = ").push_bind(channel_id);
        }
        if let Some(user_id) = &filter.user_id {
            query_builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = filter.status {
            query_builder
                .push(" AND status = ")
                .push_bind(status.as_str());
        }

        query_builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(0))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0).max(0));

        let rows = query_builder
            .build_query_as::<ExportJobRow>()
            .fetch_all(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list export jobs: {}",
                    e
                )))
            })?;

        rows.into_iter().map(ExportJob::try_from).collect()
    }

    /// List jobs with a specific status, oldest first
    pub async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<ExportJob>> {
        let rows = sqlx::query_as::<_, ExportJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM export_jobs WHERE status = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list export jobs by status: {}",
                e
            )))
        })?;

        rows.into_iter().map(ExportJob::try_from).collect()
    }

    /// Move a specific job from pending to processing
    ///
    /// Returns `false` if the job was not pending (someone else claimed it,
    /// or it was deleted).
    pub async fn claim_job(&self, id: JobId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET status = 'processing', progress = 0, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim export job: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Claim the oldest pending job
    ///
    /// Returns `None` when nothing is pending or the candidate was taken by a
    /// concurrent claimer between the lookup and the update.
    pub async fn claim_next(&self) -> Result<Option<ExportJob>> {
        let candidate: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM export_jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find pending export job: {}",
                e
            )))
        })?;

        let Some(id) = candidate.map(JobId) else {
            return Ok(None);
        };

        if !self.claim_job(id).await? {
            return Ok(None);
        }

        self.get_job(id).await
    }

    /// Record render progress of a processing job
    pub async fn update_progress(&self, id: JobId, percent: u8) -> Result<()> {
        sqlx::query("UPDATE export_jobs SET progress = ? WHERE id = ? AND status = 'processing'")
            .bind(i64::from(percent.min(100)))
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update progress: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Write the final state of a processing job
    ///
    /// Returns `false` if the job was no longer processing (deleted while
    /// rendering); the row is left untouched in that case.
    pub async fn finalize_job(&self, id: JobId, outcome: &JobOutcome) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = match outcome {
            JobOutcome::Done {
                file_path,
                file_name,
                file_size,
            } => {
                sqlx::query(
                    r#"
                    UPDATE export_jobs
                    SET status = 'done', progress = 100, updated_at = ?, finished_at = ?,
                        file_path = ?, file_name = ?, file_size = ?, error_message = NULL
                    WHERE id = ? AND status = 'processing'
                    "#,
                )
                .bind(now)
                .bind(now)
                .bind(file_path.to_string_lossy().to_string())
                .bind(file_name)
                .bind(i64::try_from(*file_size).unwrap_or(i64::MAX))
                .bind(id)
                .execute(self.pool())
                .await
            }
            JobOutcome::Failed { error } => {
                sqlx::query(
                    r#"
                    UPDATE export_jobs
                    SET status = 'failed', updated_at = ?, finished_at = ?, error_message = ?
                    WHERE id = ? AND status = 'processing'
                    "#,
                )
                .bind(now)
                .bind(now)
                .bind(error)
                .bind(id)
                .execute(self.pool())
                .await
            }
        }
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to finalize export job: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Attach cloud upload details to a finished job
    pub async fn set_upload_info(
        &self,
        id: JobId,
        url: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let meta = metadata.map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "UPDATE export_jobs SET upload_url = ?, upload_meta = ? WHERE id = ? AND status = 'done'",
        )
        .bind(url)
        .bind(meta)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set upload info: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a job row unless the worker currently owns it
    ///
    /// Returns `false` when the row is missing or in `processing`.
    pub async fn delete_job(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM export_jobs WHERE id = ? AND status != 'processing'")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete export job: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() == 1)
    }

    /// Count jobs per status
    pub async fn count_jobs_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM export_jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count export jobs: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
