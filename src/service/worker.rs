//! Worker loop: claims pending jobs one at a time and finalizes them.

use crate::db::JobOutcome;
use crate::error::Result;
use crate::types::Event;

use super::ExportService;

impl ExportService {
    /// Start the worker task
    ///
    /// This spawns a background task that repeatedly:
    /// 1. Claims the oldest pending job (at most one per tick)
    /// 2. Runs it to completion
    /// 3. Finalizes the job as done or failed
    /// 4. Sleeps for `poll_interval`
    ///
    /// Storage errors are logged and the loop continues. After
    /// [`shutdown`](Self::shutdown) the job in flight still completes and the
    /// loop exits before the next claim. Starting an already running worker
    /// is a no-op.
    pub async fn start_worker(&self) {
        let mut handle = self.worker.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Export worker already running");
            return;
        }

        let service = self.clone();
        *handle = Some(tokio::spawn(async move { service.run_worker().await }));
    }

    async fn run_worker(&self) {
        let poll_interval = self.config.export.poll_interval;
        tracing::info!(poll_interval_ms = poll_interval.as_millis() as u64, "Export worker started");

        loop {
            if self.worker.shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.process_next_job().await {
                tracing::error!(error = %e, "Export worker failed to claim or finalize a job");
            }

            tokio::select! {
                _ = self.worker.shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::info!("Export worker stopped");
    }

    /// Claim and run at most one pending job
    ///
    /// Returns `Ok(true)` when a job was processed, `Ok(false)` when nothing was
    /// pending or another worker won the claim. Errors come from the job store
    /// only; job failures are recorded on the job itself.
    pub async fn process_next_job(&self) -> Result<bool> {
        let Some(job) = self.db.claim_next().await? else {
            return Ok(false);
        };

        let id = job.id;
        tracing::info!(
            job_id = id.0,
            channel_id = %job.channel_id,
            format = job.format.as_str(),
            "Export job started"
        );
        self.emit_event(Event::JobStarted { id });

        // A panic anywhere in the job must not take the loop down with it
        let service = self.clone();
        let outcome = match tokio::spawn(async move { service.execute_job(&job).await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => JobOutcome::Failed {
                error: format!("job task panicked: {}", panic_message(e.into_panic())),
            },
            Err(e) => JobOutcome::Failed {
                error: format!("job task aborted: {e}"),
            },
        };

        if !self.db.finalize_job(id, &outcome).await? {
            tracing::warn!(job_id = id.0, "Export job was no longer processing at finalize");
            if let JobOutcome::Done { file_path, .. } = &outcome {
                remove_orphaned_artifact(id.0, file_path).await;
            }
            return Ok(true);
        }

        match outcome {
            JobOutcome::Done {
                file_name,
                file_size,
                ..
            } => {
                tracing::info!(job_id = id.0, file_name = %file_name, file_size, "Export job completed");
                self.emit_event(Event::JobCompleted {
                    id,
                    file_name,
                    file_size,
                });
            }
            JobOutcome::Failed { error } => {
                tracing::warn!(job_id = id.0, error = %error, "Export job failed");
                self.emit_event(Event::JobFailed { id, error });
            }
        }

        Ok(true)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn remove_orphaned_artifact(job_id: i64, path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(job_id, path = %path.display(), "Removed artifact of vanished export job"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(job_id, path = %path.display(), error = %e, "Failed to remove orphaned artifact")
        }
    }
}
