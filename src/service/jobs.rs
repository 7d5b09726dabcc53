//! Job control: submission, lookup, deletion, retry and artifact access.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use crate::db::{JobFilter, NewExportJob};
use crate::error::{Error, ExportError, Result};
use crate::types::{Event, ExportFormat, ExportJob, ExportRequest, JobId, JobStatus};

use super::ExportService;

/// A finished artifact ready to be streamed
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Location on disk
    pub path: PathBuf,
    /// File name offered to the client
    pub file_name: String,
    /// Content type of the format
    pub content_type: &'static str,
    /// Size in bytes
    pub size: u64,
}

impl ExportService {
    /// Submit a new export job
    ///
    /// The request is validated before anything is stored: the channel ID must
    /// be non-empty, the format supported and the time range not inverted.
    /// Options are defaulted and clamped against the configured bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) was called,
    /// a configuration error for invalid parameters, or a database error.
    pub async fn submit(&self, request: ExportRequest) -> Result<JobId> {
        if !self.worker.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let channel_id = request.channel_id.trim();
        if channel_id.is_empty() {
            return Err(Error::config("channel_id must not be empty", "channel_id"));
        }

        let format = ExportFormat::parse(&request.format)?;

        if let (Some(start), Some(end)) = (request.time_range.start, request.time_range.end)
            && start > end
        {
            return Err(Error::config(
                format!("time range start ({start}) is after end ({end})"),
                "time_range",
            ));
        }

        let options = request.options.resolve(format, &self.config.export)?;

        let job = NewExportJob {
            user_id: request.user_id,
            channel_id: channel_id.to_string(),
            format,
            time_range: request.time_range,
            filters: request.filters,
            options,
        };
        let id = self.db.insert_job(&job).await?;

        tracing::info!(
            job_id = id.0,
            channel_id = %job.channel_id,
            format = format.as_str(),
            "Export job queued"
        );
        self.emit_event(Event::JobQueued {
            id,
            channel_id: job.channel_id,
            format,
        });

        Ok(id)
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: JobId) -> Result<ExportJob> {
        self.db
            .get_job(id)
            .await?
            .ok_or_else(|| ExportError::JobNotFound { id: id.0 }.into())
    }

    /// List jobs matching `filter`, newest first
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<ExportJob>> {
        self.db.list_jobs(filter).await
    }

    /// Delete a job and its artifact
    ///
    /// A job being processed cannot be deleted; the worker still owns it.
    pub async fn delete_job(&self, id: JobId) -> Result<()> {
        let job = self.get_job(id).await?;

        if job.status == JobStatus::Processing {
            return Err(ExportError::InvalidState {
                id: id.0,
                operation: "delete".to_string(),
                current_state: job.status.to_string(),
            }
            .into());
        }

        // The worker may claim the job between the lookup and the delete
        if !self.db.delete_job(id).await? {
            return Err(match self.db.get_job(id).await? {
                Some(current) => ExportError::InvalidState {
                    id: id.0,
                    operation: "delete".to_string(),
                    current_state: current.status.to_string(),
                },
                None => ExportError::JobNotFound { id: id.0 },
            }
            .into());
        }

        if let Some(path) = &job.file_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    tracing::debug!(job_id = id.0, path = %path.display(), "Removed export artifact")
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(job_id = id.0, path = %path.display(), error = %e, "Failed to remove export artifact")
                }
            }
        }

        tracing::info!(job_id = id.0, "Export job deleted");
        self.emit_event(Event::JobRemoved { id });
        Ok(())
    }

    /// Queue a new job with the parameters of a finished one
    ///
    /// The original job is left untouched.
    pub async fn retry_job(&self, id: JobId) -> Result<JobId> {
        let job = self.get_job(id).await?;

        if !job.status.is_finished() {
            return Err(ExportError::InvalidState {
                id: id.0,
                operation: "retry".to_string(),
                current_state: job.status.to_string(),
            }
            .into());
        }

        let new_id = self.submit(job.to_request()).await?;
        tracing::info!(job_id = new_id.0, retried_from = id.0, "Export job retried");
        Ok(new_id)
    }

    /// Locate the finished artifact of a job
    ///
    /// # Errors
    ///
    /// [`ExportError::InvalidState`] unless the job is done, and
    /// [`ExportError::ArtifactMissing`] when the file is gone from disk.
    pub async fn open_artifact(&self, id: JobId) -> Result<Artifact> {
        let job = self.get_job(id).await?;

        if job.status != JobStatus::Done {
            return Err(ExportError::InvalidState {
                id: id.0,
                operation: "download".to_string(),
                current_state: job.status.to_string(),
            }
            .into());
        }

        let path = job
            .file_path
            .clone()
            .ok_or_else(|| ExportError::ArtifactMissing {
                id: id.0,
                path: PathBuf::new(),
            })?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExportError::ArtifactMissing { id: id.0, path }.into());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let file_name = job.file_name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("export-{id}.{}", job.format.extension()))
        });

        Ok(Artifact {
            path,
            file_name,
            content_type: job.format.content_type(),
            size: metadata.len(),
        })
    }

    /// Record where a finished artifact was uploaded
    pub async fn set_upload_info(
        &self,
        id: JobId,
        url: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        if self.db.set_upload_info(id, url, metadata).await? {
            return Ok(());
        }

        let job = self.get_job(id).await?;
        Err(ExportError::InvalidState {
            id: id.0,
            operation: "set upload info".to_string(),
            current_state: job.status.to_string(),
        }
        .into())
    }
}
