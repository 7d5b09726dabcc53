//! Export service split into focused submodules.
//!
//! The `ExportService` struct and its methods are organized by domain:
//! - [`jobs`] - Submission, lookup, deletion, retry and artifact access
//! - [`worker`] - Polling loop that claims and finalizes jobs
//! - [`job_task`] - Execution of one claimed job (single file or viewer archive)
//! - [`lifecycle`] - Startup report and shutdown coordination

mod job_task;
mod jobs;
mod lifecycle;
mod worker;

pub use jobs::Artifact;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::source::Collaborators;
use crate::types::Event;

/// Worker coordination state
#[derive(Clone)]
pub(crate) struct WorkerState {
    /// Flag to indicate whether new submissions are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled on shutdown; the worker checks it between jobs
    pub(crate) shutdown: tokio_util::sync::CancellationToken,
    /// Handle of the running worker loop, if started
    pub(crate) handle: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

/// Main export service (cloneable - all fields are Arc-wrapped)
///
/// Built once at process start and handed to the worker and the API by clone.
#[derive(Clone)]
pub struct ExportService {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query job rows directly
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Global download rate limiter shared by every artifact download
    pub(crate) rate_limiter: RateLimiter,
    /// Message store, channel registry, identities, attachments, renderer
    pub(crate) collaborators: Collaborators,
    /// Worker coordination
    pub(crate) worker: WorkerState,
}

impl ExportService {
    /// Create a new ExportService instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the export directory
    /// - Opens/creates the SQLite database and runs migrations
    /// - Sets up the event broadcast channel
    /// - Logs jobs left in `processing` by a previous run
    ///
    /// The worker is not started; call [`start_worker`](Self::start_worker).
    pub async fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.export_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create export directory '{}': {}",
                        config.export_dir().display(),
                        e
                    ),
                ))
            })?;

        let db = Database::new(&config.persistence.database_path).await?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let rate_limiter = RateLimiter::from_config(&config.download);
        tracing::info!(
            rate_limit_bps = ?rate_limiter.rate(),
            burst_bytes = ?rate_limiter.burst(),
            "Download rate limiter initialized"
        );

        let service = Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            rate_limiter,
            collaborators,
            worker: WorkerState {
                accepting_new: Arc::new(AtomicBool::new(true)),
                shutdown: tokio_util::sync::CancellationToken::new(),
                handle: Arc::new(tokio::sync::Mutex::new(None)),
            },
        };

        service.report_stuck_jobs().await?;

        Ok(service)
    }

    /// Subscribe to export events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than 1000 events receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The download rate limiter
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let service = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(service, config).await })
    }
}
