//! Core types for channel-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

use crate::config::ExportConfig;
use crate::error::{Error, ExportError, Result};

/// Unique identifier for an export job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for JobId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobId {
    fn decode(
        value: sqlx::sqlite::SqliteValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Export job lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed by the worker
    Pending,
    /// Claimed by the worker and rendering
    Processing,
    /// Artifact written successfully
    Done,
    /// Failed with an error message
    Failed,
}

impl JobStatus {
    /// Column value stored in the job table
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a stored column value; unknown values read as `Failed`
    pub fn from_db(value: &str) -> Self {
        match value {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "done" => JobStatus::Done,
            _ => JobStatus::Failed,
        }
    }

    /// Whether the job reached a final state
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::config(format!("unknown job status '{other}'"), "status")),
        }
    }
}

/// Output format of an export
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Versioned structured log (one JSON document)
    Json,
    /// Plain text, one line per message
    #[serde(rename = "txt")]
    Text,
    /// Single HTML page
    Html,
    /// Multi-part HTML viewer packed into a zip archive
    HtmlViewer,
}

impl ExportFormat {
    /// Parse a format token as submitted by clients
    pub fn parse(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Text),
            "html" => Ok(ExportFormat::Html),
            "html_viewer" | "viewer" => Ok(ExportFormat::HtmlViewer),
            other => Err(ExportError::UnsupportedFormat(other.to_string()).into()),
        }
    }

    /// Canonical token stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Html => "html",
            ExportFormat::HtmlViewer => "html_viewer",
        }
    }

    /// File extension of the finished artifact
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Html => "html",
            ExportFormat::HtmlViewer => "zip",
        }
    }

    /// Content type served on download
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::HtmlViewer => "application/zip",
        }
    }

    /// Whether this format goes through the chunked viewer path
    pub fn is_viewer(&self) -> bool {
        matches!(self, ExportFormat::HtmlViewer)
    }
}

/// Optional time window, epoch milliseconds, both ends inclusive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimeRange {
    /// Earliest message timestamp to include
    #[serde(default)]
    pub start: Option<i64>,
    /// Latest message timestamp to include
    #[serde(default)]
    pub end: Option<i64>,
}

impl TimeRange {
    /// Whether `ts` falls within the window
    pub fn contains(&self, ts: i64) -> bool {
        self.start.is_none_or(|s| ts >= s) && self.end.is_none_or(|e| ts <= e)
    }
}

/// Content filters applied when loading messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExportFilters {
    /// Include out-of-character messages (default: true)
    #[serde(default = "default_true")]
    pub include_ooc: bool,
    /// Include archived messages (default: false)
    #[serde(default)]
    pub include_archived: bool,
    /// Omit timestamps from the rendered output (default: false)
    #[serde(default)]
    pub without_timestamp: bool,
    /// Merge consecutive messages from the same sender (default: false)
    #[serde(default)]
    pub merge_messages: bool,
}

impl Default for ExportFilters {
    fn default() -> Self {
        Self {
            include_ooc: true,
            include_archived: false,
            without_timestamp: false,
            merge_messages: false,
        }
    }
}

/// Per-job tuning and display options
///
/// Submitted values are validated and defaulted once by [`ExportOptions::resolve`];
/// every stored job carries concrete `slice_size` and `max_concurrency`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExportOptions {
    /// Messages per viewer part / per loading page
    #[serde(default)]
    pub slice_size: Option<usize>,
    /// Parallel part renders for viewer exports
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Wrap plain-text lines in color markup
    #[serde(default)]
    pub colorize: bool,
    /// Replace attachment references with inline data URIs in viewer parts
    #[serde(default)]
    pub inline_media: bool,
    /// Opaque viewer display settings, passed through to the page
    #[serde(default)]
    #[schema(value_type = Object)]
    pub display_settings: serde_json::Value,
}

impl ExportOptions {
    /// Fill defaults and clamp tuning values against the configured bounds
    pub fn resolve(mut self, format: ExportFormat, config: &ExportConfig) -> Result<Self> {
        if self.slice_size == Some(0) {
            return Err(Error::config("slice_size must be at least 1", "slice_size"));
        }
        if self.max_concurrency == Some(0) {
            return Err(Error::config(
                "max_concurrency must be at least 1",
                "max_concurrency",
            ));
        }
        if !(self.display_settings.is_null() || self.display_settings.is_object()) {
            return Err(Error::config(
                "display_settings must be an object",
                "display_settings",
            ));
        }

        let (min, max, fallback) = if format.is_viewer() {
            (
                config.viewer_min_slice,
                config.viewer_max_slice,
                config.default_viewer_slice,
            )
        } else {
            (config.min_slice, config.max_slice, config.max_slice)
        };
        self.slice_size = Some(self.slice_size.unwrap_or(fallback).clamp(min, max));
        self.max_concurrency = Some(
            self.max_concurrency
                .unwrap_or(config.default_render_concurrency)
                .clamp(1, config.max_render_concurrency.max(1)),
        );
        if self.display_settings.is_null() {
            self.display_settings = serde_json::Value::Object(Default::default());
        }
        Ok(self)
    }

    /// Resolved slice size (falls back to 1 for unresolved options)
    pub fn slice_size(&self) -> usize {
        self.slice_size.unwrap_or(1).max(1)
    }

    /// Resolved render concurrency (falls back to 1 for unresolved options)
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(1).max(1)
    }
}

/// Export submission parameters
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportRequest {
    /// Requesting user
    pub user_id: String,
    /// Channel to export
    pub channel_id: String,
    /// Format token: json, txt, html or html_viewer
    pub format: String,
    /// Optional time window
    #[serde(default)]
    pub time_range: TimeRange,
    /// Content filters
    #[serde(default)]
    pub filters: ExportFilters,
    /// Tuning and display options
    #[serde(default)]
    pub options: ExportOptions,
}

/// A stored export job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportJob {
    /// Job ID
    pub id: JobId,
    /// Owning user
    pub user_id: String,
    /// Exported channel
    pub channel_id: String,
    /// Output format
    pub format: ExportFormat,
    /// Time window
    pub time_range: TimeRange,
    /// Content filters
    pub filters: ExportFilters,
    /// Resolved options
    pub options: ExportOptions,
    /// Lifecycle status
    pub status: JobStatus,
    /// Render progress (0-100)
    pub progress: u8,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// When the job reached done/failed
    pub finished_at: Option<DateTime<Utc>>,
    /// Artifact path on disk
    #[schema(value_type = Option<String>)]
    pub file_path: Option<PathBuf>,
    /// Artifact file name offered on download
    pub file_name: Option<String>,
    /// Artifact size in bytes
    pub file_size: Option<u64>,
    /// Failure reason
    pub error_message: Option<String>,
    /// Cloud upload location, once uploaded
    pub upload_url: Option<String>,
    /// Cloud upload metadata
    #[schema(value_type = Object)]
    pub upload_meta: Option<serde_json::Value>,
}

impl ExportJob {
    /// Parameters for a fresh job with the same settings (used by retry)
    pub fn to_request(&self) -> ExportRequest {
        ExportRequest {
            user_id: self.user_id.clone(),
            channel_id: self.channel_id.clone(),
            format: self.format.as_str().to_string(),
            time_range: self.time_range,
            filters: self.filters,
            options: self.options.clone(),
        }
    }
}

/// Event emitted during the export job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and stored as pending
    JobQueued {
        /// Job ID
        id: JobId,
        /// Channel being exported
        channel_id: String,
        /// Format token
        format: ExportFormat,
    },

    /// Worker claimed the job
    JobStarted {
        /// Job ID
        id: JobId,
    },

    /// Viewer part progress
    JobProgress {
        /// Job ID
        id: JobId,
        /// Progress percentage (0 to 100)
        percent: u8,
    },

    /// Artifact written and job finalized as done
    JobCompleted {
        /// Job ID
        id: JobId,
        /// Artifact file name
        file_name: String,
        /// Artifact size in bytes
        file_size: u64,
    },

    /// Job finalized as failed
    JobFailed {
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// Job and artifact deleted
    JobRemoved {
        /// Job ID
        id: JobId,
    },

    /// Service is shutting down
    Shutdown,
}

fn default_true() -> bool {
    true
}
