//! Error types for channel-export
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Database, Export)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for channel-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or submission parameter error
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key or request field that caused the error
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Export pipeline error
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip writer error
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic lookup miss (channel, collaborator record)
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new export jobs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a submission validation failure on a named field
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Export job and rendering errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// Job not found in the store
    #[error("export job {id} not found")]
    JobNotFound {
        /// The job ID that was not found
        id: i64,
    },

    /// Cannot perform operation in the job's current state
    #[error("cannot {operation} export job {id} in state {current_state}")]
    InvalidState {
        /// The job ID
        id: i64,
        /// The operation that was attempted (e.g., "retry", "download")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// Format token not recognized
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// A chunk or template render failed
    #[error("render failed for part {part}: {reason}")]
    RenderFailed {
        /// Zero-based slice index
        part: usize,
        /// The reason rendering failed
        reason: String,
    },

    /// Writing the viewer archive failed
    #[error("archive assembly failed for {path}: {reason}")]
    ArchiveFailed {
        /// Archive path being written
        path: PathBuf,
        /// The reason assembly failed
        reason: String,
    },

    /// Job is done but its artifact is gone from disk
    #[error("artifact for export job {id} missing at {path}")]
    ArtifactMissing {
        /// The job ID
        id: i64,
        /// Expected artifact path
        path: PathBuf,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "export job 123 not found",
///     "details": { "job_id": 123 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "job_not_found", "config_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Export(ExportError::UnsupportedFormat(_)) => 400,

            Error::NotFound(_) => 404,
            Error::Export(ExportError::JobNotFound { .. }) => 404,
            Error::Export(ExportError::ArtifactMissing { .. }) => 404,

            Error::Export(ExportError::InvalidState { .. }) => 409,

            Error::Export(ExportError::RenderFailed { .. }) => 422,
            Error::Export(ExportError::ArchiveFailed { .. }) => 500,

            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Zip(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Export(e) => match e {
                ExportError::JobNotFound { .. } => "job_not_found",
                ExportError::InvalidState { .. } => "invalid_state",
                ExportError::UnsupportedFormat(_) => "unsupported_format",
                ExportError::RenderFailed { .. } => "render_failed",
                ExportError::ArchiveFailed { .. } => "archive_failed",
                ExportError::ArtifactMissing { .. } => "artifact_missing",
            },
            Error::Io(_) => "io_error",
            Error::Zip(_) => "zip_error",
            Error::Serialization(_) => "serialization_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let mut api_error = ApiError::new(error.error_code(), error.to_string());

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "field": key,
            })),
            Error::Export(ExportError::JobNotFound { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Export(ExportError::InvalidState {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "job_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Export(ExportError::ArtifactMissing { id, path }) => Some(serde_json::json!({
                "job_id": id,
                "path": path,
            })),
            _ => None,
        };

        api_error.error.details = details;
        api_error
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::config("unknown format", "format"),
                400,
                "config_error",
            ),
            (
                Error::Export(ExportError::UnsupportedFormat("pdf".into())),
                400,
                "unsupported_format",
            ),
            (Error::NotFound("channel c1".into()), 404, "not_found"),
            (
                Error::Export(ExportError::JobNotFound { id: 7 }),
                404,
                "job_not_found",
            ),
            (
                Error::Export(ExportError::ArtifactMissing {
                    id: 7,
                    path: PathBuf::from("/tmp/x.zip"),
                }),
                404,
                "artifact_missing",
            ),
            (
                Error::Export(ExportError::InvalidState {
                    id: 7,
                    operation: "retry".into(),
                    current_state: "processing".into(),
                }),
                409,
                "invalid_state",
            ),
            (
                Error::Export(ExportError::RenderFailed {
                    part: 2,
                    reason: "template".into(),
                }),
                422,
                "render_failed",
            ),
            (
                Error::Database(DatabaseError::QueryFailed("locked".into())),
                500,
                "database_error",
            ),
            (
                Error::Io(std::io::Error::other("disk full")),
                500,
                "io_error",
            ),
            (Error::ShuttingDown, 503, "shutting_down"),
            (Error::Other("boom".into()), 500, "internal_error"),
        ]
    }

    #[test]
    fn test_status_and_error_codes() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(error.status_code(), status, "status for {error}");
            assert_eq!(error.error_code(), code, "code for {error}");
        }
    }

    #[test]
    fn test_api_error_carries_job_details() {
        let api_error: ApiError = Error::Export(ExportError::InvalidState {
            id: 42,
            operation: "retry".into(),
            current_state: "pending".into(),
        })
        .into();

        assert_eq!(api_error.error.code, "invalid_state");
        let details = api_error.error.details.unwrap();
        assert_eq!(details["job_id"], 42);
        assert_eq!(details["current_state"], "pending");
    }

    #[test]
    fn test_config_error_names_field() {
        let api_error: ApiError = Error::config("channel_id must not be empty", "channel_id").into();
        assert_eq!(api_error.error.code, "config_error");
        assert_eq!(api_error.error.details.unwrap()["field"], "channel_id");
    }

    #[test]
    fn test_api_error_omits_empty_details() {
        let api_error: ApiError = Error::ShuttingDown.into();
        let json = serde_json::to_value(api_error).unwrap();
        assert!(json["error"].get("details").is_none());
        assert_eq!(json["error"]["code"], "shutting_down");
    }
}
