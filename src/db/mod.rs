//! Database layer for channel-export
//!
//! Handles SQLite persistence of export jobs.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`jobs`] - Job queue CRUD, atomic claim and finalize

use crate::error::{Error, Result};
use crate::types::{
    ExportFilters, ExportFormat, ExportJob, ExportOptions, JobId, JobStatus, TimeRange,
};
use chrono::{TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod jobs;
mod migrations;

/// New export job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewExportJob {
    /// Requesting user
    pub user_id: String,
    /// Channel to export
    pub channel_id: String,
    /// Output format
    pub format: ExportFormat,
    /// Time window
    pub time_range: TimeRange,
    /// Content filters
    pub filters: ExportFilters,
    /// Resolved options (serialized into the `options` column)
    pub options: ExportOptions,
}

/// Final state written by [`Database::finalize_job`]
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Artifact written
    Done {
        /// Artifact location
        file_path: PathBuf,
        /// File name offered on download
        file_name: String,
        /// Artifact size in bytes
        file_size: u64,
    },
    /// Job failed
    Failed {
        /// Failure reason
        error: String,
    },
}

/// Listing filter for [`Database::list_jobs`]
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs for this channel
    pub channel_id: Option<String>,
    /// Only jobs owned by this user
    pub user_id: Option<String>,
    /// Only jobs in this status
    pub status: Option<JobStatus>,
    /// Maximum rows returned (default: 100)
    pub limit: Option<i64>,
    /// Rows skipped
    pub offset: Option<i64>,
}

/// Export job record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct ExportJobRow {
    /// Unique database ID
    pub id: i64,
    /// Requesting user
    pub user_id: String,
    /// Channel to export
    pub channel_id: String,
    /// Format token
    pub format: String,
    /// Time window start (epoch ms)
    pub range_start: Option<i64>,
    /// Time window end (epoch ms)
    pub range_end: Option<i64>,
    /// Include out-of-character messages
    pub include_ooc: bool,
    /// Include archived messages
    pub include_archived: bool,
    /// Omit timestamps
    pub without_timestamp: bool,
    /// Merge consecutive messages
    pub merge_messages: bool,
    /// Resolved options as JSON
    pub options: String,
    /// Status token
    pub status: String,
    /// Progress (0-100)
    pub progress: i64,
    /// Unix timestamp when the job was created
    pub created_at: i64,
    /// Unix timestamp of the last status change
    pub updated_at: i64,
    /// Unix timestamp when the job finished
    pub finished_at: Option<i64>,
    /// Artifact path
    pub file_path: Option<String>,
    /// Artifact file name
    pub file_name: Option<String>,
    /// Artifact size in bytes
    pub file_size: Option<i64>,
    /// Failure reason
    pub error_message: Option<String>,
    /// Cloud upload location
    pub upload_url: Option<String>,
    /// Cloud upload metadata as JSON
    pub upload_meta: Option<String>,
}

impl TryFrom<ExportJobRow> for ExportJob {
    type Error = Error;

    fn try_from(row: ExportJobRow) -> Result<Self> {
        let ts = |secs: i64| Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now);

        Ok(ExportJob {
            id: JobId(row.id),
            user_id: row.user_id,
            channel_id: row.channel_id,
            format: ExportFormat::parse(&row.format)?,
            time_range: TimeRange {
                start: row.range_start,
                end: row.range_end,
            },
            filters: ExportFilters {
                include_ooc: row.include_ooc,
                include_archived: row.include_archived,
                without_timestamp: row.without_timestamp,
                merge_messages: row.merge_messages,
            },
            options: serde_json::from_str(&row.options)?,
            status: JobStatus::from_db(&row.status),
            progress: row.progress.clamp(0, 100) as u8,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
            finished_at: row.finished_at.map(ts),
            file_path: row.file_path.map(PathBuf::from),
            file_name: row.file_name,
            file_size: row.file_size.map(|s| s.max(0) as u64),
            error_message: row.error_message,
            upload_url: row.upload_url,
            upload_meta: row
                .upload_meta
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        })
    }
}

/// Database handle for channel-export
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
