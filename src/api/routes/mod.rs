//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`exports`] - Export job management and downloads
//! - [`system`] - Health, events, OpenAPI

use serde::{Deserialize, Serialize};

use crate::db::JobFilter;
use crate::types::{JobId, JobStatus};

mod exports;
mod system;

pub use exports::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /exports
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListExportsQuery {
    /// Only jobs for this channel
    pub channel_id: Option<String>,
    /// Only jobs submitted by this user
    pub user_id: Option<String>,
    /// Only jobs in this status: pending, processing, done or failed
    pub status: Option<JobStatus>,
    /// Maximum number of jobs to return (default: 100)
    pub limit: Option<i64>,
    /// Number of jobs to skip (default: 0)
    pub offset: Option<i64>,
}

impl From<ListExportsQuery> for JobFilter {
    fn from(query: ListExportsQuery) -> Self {
        JobFilter {
            channel_id: query.channel_id,
            user_id: query.user_id,
            status: query.status,
            limit: query.limit,
            offset: query.offset,
        }
    }
}

/// Response for POST /exports and POST /exports/:id/retry
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct JobCreatedResponse {
    /// ID of the queued job
    pub id: JobId,
}

/// Request body for PUT /exports/:id/upload
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct UploadInfoRequest {
    /// Where the artifact was uploaded
    pub url: String,
    /// Provider-specific metadata
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Value>,
}
