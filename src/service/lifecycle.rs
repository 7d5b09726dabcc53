//! Startup report and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::{Event, JobStatus};

use super::ExportService;

/// Upper bound on waiting for the in-flight job during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl ExportService {
    /// Log jobs left in `processing` by a previous run
    ///
    /// They are not requeued. A crash mid-job needs an operator to repair the
    /// row in the job database.
    pub(crate) async fn report_stuck_jobs(&self) -> Result<()> {
        let stuck = self.db.list_jobs_by_status(JobStatus::Processing).await?;

        for job in &stuck {
            tracing::warn!(
                job_id = job.id.0,
                channel_id = %job.channel_id,
                format = job.format.as_str(),
                updated_at = %job.updated_at,
                "Export job left in processing by a previous run, manual intervention required"
            );
        }

        if !stuck.is_empty() {
            tracing::warn!(count = stuck.len(), "Found export jobs stuck in processing");
        }

        let pending = self.db.count_jobs_by_status(JobStatus::Pending).await?;
        if pending > 0 {
            tracing::info!(pending, "Resuming export queue");
        }

        Ok(())
    }

    /// Gracefully shut down the service
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new submissions
    /// 2. Signals the worker to stop after the job in flight
    /// 3. Waits for the worker to exit with a timeout (30 seconds)
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Calling it more than once is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new submissions
        self.worker.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new export jobs");

        // 2. Signal the worker
        self.worker.shutdown.cancel();

        // 3. Wait for the in-flight job to finish
        let handle = self.worker.handle.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => tracing::info!("Export worker stopped gracefully"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Export worker task ended abnormally"),
                Err(_) => tracing::warn!(
                    "Timeout waiting for the export worker, proceeding with shutdown"
                ),
            }
        }

        // 4. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.worker.accepting_new.load(Ordering::SeqCst)
    }
}
