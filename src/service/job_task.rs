//! Execution of one claimed export job.
//!
//! Loads the channel's messages, optionally merges them, then either formats a
//! single file or renders the multi-part viewer archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{Database, JobOutcome};
use crate::error::{Error, Result};
use crate::export::archive::{assemble_archive, write_file};
use crate::export::merge::merge_messages;
use crate::export::partition::{clamp_slice_size, partition};
use crate::export::render::ViewerPartRenderer;
use crate::export::viewer::{MANIFEST_VERSION, render_index};
use crate::export::{PayloadBuilder, RenderProgress, ViewerManifest, formatter_for, render_parts};
use crate::source::{ChannelMessage, MessageQuery};
use crate::types::{Event, ExportJob, JobId};

use super::ExportService;

/// Writes viewer render progress to the job row and the event stream
struct JobProgressReporter {
    id: JobId,
    db: Arc<Database>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

#[async_trait]
impl RenderProgress for JobProgressReporter {
    async fn part_rendered(&self, done: usize, total: usize) {
        // 100 is reserved for the finalized job
        let percent = ((done * 100) / total.max(1)).min(99) as u8;

        if let Err(e) = self.db.update_progress(self.id, percent).await {
            tracing::warn!(job_id = self.id.0, error = %e, "Failed to record export progress");
        }
        self.event_tx
            .send(Event::JobProgress {
                id: self.id,
                percent,
            })
            .ok();
    }
}

/// Artifact file name: `<channel>-<job id>-<yyyymmddHHMMSS>.<ext>`
pub(crate) fn artifact_file_name(job: &ExportJob, generated_at: DateTime<Utc>) -> String {
    let channel: String = job
        .channel_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "{}-{}-{}.{}",
        channel,
        job.id,
        generated_at.format("%Y%m%d%H%M%S"),
        job.format.extension()
    )
}

impl ExportService {
    /// Run a claimed job to a final outcome
    ///
    /// Never returns an error: failures are captured as [`JobOutcome::Failed`].
    pub(crate) async fn execute_job(&self, job: &ExportJob) -> JobOutcome {
        match self.render_job(job).await {
            Ok((file_path, file_name, file_size)) => JobOutcome::Done {
                file_path,
                file_name,
                file_size,
            },
            Err(e) => JobOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    async fn render_job(&self, job: &ExportJob) -> Result<(PathBuf, String, u64)> {
        let channels = &self.collaborators.channels;
        let channel_name = channels
            .channel_name(&job.channel_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("channel '{}'", job.channel_id)))?;

        let mut messages = self.load_messages(job).await?;
        let loaded = messages.len();
        if job.filters.merge_messages {
            messages = merge_messages(messages, self.config.export.merge_window);
        }
        tracing::debug!(
            job_id = job.id.0,
            loaded,
            exported = messages.len(),
            "Loaded channel messages"
        );

        let builder = PayloadBuilder::new(
            job.channel_id.clone(),
            channel_name,
            Arc::clone(&self.collaborators.identities),
        )
        .time_range(job.time_range)
        .filters(job.filters)
        .colorize(job.options.colorize)
        .display_settings(job.options.display_settings.clone());

        let file_name = artifact_file_name(job, builder.generation_time());
        let path = self.config.export_dir().join(&file_name);

        let size = if job.format.is_viewer() {
            self.render_viewer(job, builder, messages, &path).await?
        } else {
            let payload = builder.build(&messages, None).await?;
            let formatter = formatter_for(job.format, &self.collaborators.assets)?;
            let output = formatter.format(&payload, self.collaborators.rich_text.as_ref())?;
            write_file(&path, &output.bytes).await?
        };

        Ok((path, file_name, size))
    }

    /// Page through the message source until a short page
    async fn load_messages(&self, job: &ExportJob) -> Result<Vec<ChannelMessage>> {
        let export = &self.config.export;
        let page_size = clamp_slice_size(job.options.slice_size(), export.min_slice, export.max_slice);
        let query = MessageQuery::new(job.channel_id.clone(), job.time_range, &job.filters);

        let mut messages = Vec::new();
        loop {
            let page = self
                .collaborators
                .messages
                .load_messages(&query, messages.len(), page_size)
                .await?;
            let short = page.len() < page_size;
            messages.extend(page);
            if short {
                break;
            }
        }
        Ok(messages)
    }

    async fn render_viewer(
        &self,
        job: &ExportJob,
        builder: PayloadBuilder,
        messages: Vec<ChannelMessage>,
        path: &Path,
    ) -> Result<u64> {
        let export = &self.config.export;
        let slice_size = clamp_slice_size(
            job.options.slice_size(),
            export.viewer_min_slice,
            export.viewer_max_slice,
        );
        let max_concurrency = job
            .options
            .max_concurrency()
            .clamp(1, export.max_render_concurrency.max(1));

        let total_messages = messages.len();
        let slices = partition(messages, slice_size);
        let part_count = slices.len();

        tracing::info!(
            job_id = job.id.0,
            total_messages,
            part_count,
            slice_size,
            max_concurrency,
            "Rendering viewer parts"
        );

        let attachments = job
            .options
            .inline_media
            .then(|| Arc::clone(&self.collaborators.attachments));
        let channel_id = builder.channel_id().to_string();
        let channel_name = builder.channel_name().to_string();
        let generated_at = builder.generation_time();

        let renderer = Arc::new(ViewerPartRenderer::new(
            builder,
            Arc::clone(&self.collaborators.rich_text),
            attachments,
            self.collaborators.assets.clone(),
            job.options.display_settings.clone(),
        ));
        let progress = JobProgressReporter {
            id: job.id,
            db: Arc::clone(&self.db),
            event_tx: self.event_tx.clone(),
        };

        let parts = render_parts(
            renderer,
            slices,
            max_concurrency,
            export.max_render_concurrency,
            &progress,
        )
        .await?;

        let manifest = ViewerManifest {
            version: MANIFEST_VERSION,
            channel_id,
            channel_name,
            generated_at,
            display_settings: job.options.display_settings.clone(),
            slice_size,
            max_concurrency,
            part_count,
            total_messages,
            parts: parts.iter().map(|part| part.manifest.clone()).collect(),
        };
        let index_html = render_index(&manifest, &self.collaborators.assets)?;

        assemble_archive(path, parts, &manifest, index_html).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExportFilters, ExportFormat, ExportOptions, JobStatus, TimeRange};
    use chrono::TimeZone;

    fn job(channel_id: &str, format: ExportFormat) -> ExportJob {
        let now = Utc::now();
        ExportJob {
            id: JobId(42),
            user_id: "u1".to_string(),
            channel_id: channel_id.to_string(),
            format,
            time_range: TimeRange::default(),
            filters: ExportFilters::default(),
            options: ExportOptions::default(),
            status: JobStatus::Processing,
            progress: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
            file_path: None,
            file_name: None,
            file_size: None,
            error_message: None,
            upload_url: None,
            upload_meta: None,
        }
    }

    #[test]
    fn test_artifact_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();

        assert_eq!(
            artifact_file_name(&job("general", ExportFormat::Json), at),
            "general-42-20240309070501.json"
        );
        assert_eq!(
            artifact_file_name(&job("../a b", ExportFormat::HtmlViewer), at),
            "___a_b-42-20240309070501.zip"
        );
    }
}
