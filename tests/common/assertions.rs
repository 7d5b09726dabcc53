//! Waiting helpers for asynchronous job completion

use channel_export::{Event, ExportRequest, ExportService, JobId};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;

/// Result of waiting for a job to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Job completed successfully
    Completed,
    /// Job failed with error
    Failed(String),
    /// Timeout waiting for completion
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait on `events` until job `id` completes or fails
///
/// Subscribe before submitting so the final event cannot be missed.
pub async fn wait_for_job(
    mut events: Receiver<Event>,
    id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::JobCompleted { id: event_id, .. }) if event_id == id => {
                    return WaitResult::Completed;
                }
                Ok(Event::JobFailed {
                    id: event_id,
                    error,
                }) if event_id == id => {
                    return WaitResult::Failed(error);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Submit `request` and wait for the worker to finish it
pub async fn run_job(service: &ExportService, request: ExportRequest) -> (JobId, WaitResult) {
    let events = service.subscribe();
    let id = service
        .submit(request)
        .await
        .expect("Failed to submit export");
    (id, wait_for_job(events, id, Duration::from_secs(20)).await)
}
