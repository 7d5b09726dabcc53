//! Export job handlers.

use super::{JobCreatedResponse, ListExportsQuery, UploadInfoRequest};
use crate::api::AppState;
use crate::error::Result;
use crate::types::{ExportJob, ExportRequest, JobId};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;

/// POST /exports - Submit an export job
#[utoipa::path(
    post,
    path = "/exports",
    tag = "exports",
    request_body = crate::types::ExportRequest,
    responses(
        (status = 201, description = "Job queued", body = JobCreatedResponse),
        (status = 400, description = "Invalid format, channel or time range", body = crate::error::ApiError),
        (status = 503, description = "Service is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn create_export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<impl IntoResponse> {
    let id = state.service.submit(request).await?;
    Ok((StatusCode::CREATED, Json(JobCreatedResponse { id })))
}

/// GET /exports - List export jobs, newest first
#[utoipa::path(
    get,
    path = "/exports",
    tag = "exports",
    params(ListExportsQuery),
    responses(
        (status = 200, description = "Matching jobs", body = Vec<crate::types::ExportJob>),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_exports(
    State(state): State<AppState>,
    Query(query): Query<ListExportsQuery>,
) -> Result<Json<Vec<ExportJob>>> {
    let jobs = state.service.list_jobs(&query.into()).await?;
    Ok(Json(jobs))
}

/// GET /exports/:id - Job status and progress
#[utoipa::path(
    get,
    path = "/exports/{id}",
    tag = "exports",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job information", body = crate::types::ExportJob),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_export(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ExportJob>> {
    let job = state.service.get_job(JobId(id)).await?;
    Ok(Json(job))
}

/// DELETE /exports/:id - Delete a job and its artifact
#[utoipa::path(
    delete,
    path = "/exports/{id}",
    tag = "exports",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job is being processed", body = crate::error::ApiError)
    )
)]
pub async fn delete_export(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.service.delete_job(JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /exports/:id/retry - Queue a new job with the parameters of a finished one
#[utoipa::path(
    post,
    path = "/exports/{id}/retry",
    tag = "exports",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 201, description = "New job queued", body = JobCreatedResponse),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job has not finished", body = crate::error::ApiError)
    )
)]
pub async fn retry_export(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let id = state.service.retry_job(JobId(id)).await?;
    Ok((StatusCode::CREATED, Json(JobCreatedResponse { id })))
}

/// GET /exports/:id/download - Stream the finished artifact
///
/// The body is read in `chunk_size` pieces; every piece passes through the
/// global download rate limiter before it is sent.
#[utoipa::path(
    get,
    path = "/exports/{id}/download",
    tag = "exports",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Job or artifact not found", body = crate::error::ApiError),
        (status = 409, description = "Job is not done", body = crate::error::ApiError)
    )
)]
pub async fn download_export(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let artifact = state.service.open_artifact(JobId(id)).await?;
    let file = tokio::fs::File::open(&artifact.path).await?;

    let limiter = state.service.rate_limiter().clone();
    let chunk_size = state.config.download.chunk_size;
    let stream = ReaderStream::with_capacity(file, chunk_size).then(move |chunk| {
        let limiter = limiter.clone();
        async move {
            if let Ok(bytes) = &chunk {
                limiter.wait_bytes(bytes.len() as u64).await;
            }
            chunk
        }
    });

    tracing::info!(
        job_id = id,
        file_name = %artifact.file_name,
        size = artifact.size,
        "Streaming export artifact"
    );

    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.file_name.replace(['"', '\\'], "_")
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_LENGTH, artifact.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// PUT /exports/:id/upload - Record where the artifact was uploaded
#[utoipa::path(
    put,
    path = "/exports/{id}/upload",
    tag = "exports",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    request_body = UploadInfoRequest,
    responses(
        (status = 200, description = "Updated job", body = crate::types::ExportJob),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job is not done", body = crate::error::ApiError)
    )
)]
pub async fn set_upload_info(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UploadInfoRequest>,
) -> Result<Json<ExportJob>> {
    let id = JobId(id);
    state
        .service
        .set_upload_info(id, &request.url, request.metadata.as_ref())
        .await?;
    Ok(Json(state.service.get_job(id).await?))
}
