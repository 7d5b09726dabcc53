//! # channel-export
//!
//! Asynchronous export of channel message history into downloadable archives.
//!
//! Exports are submitted as durable jobs, claimed one at a time by a polling
//! worker and written to disk as a structured log (`json`), plain text (`txt`),
//! a single HTML page (`html`) or a multi-part HTML viewer packed into a zip
//! archive (`html_viewer`). Finished artifacts are served through a global
//! token-bucket rate limiter.
//!
//! The message store, channel registry, identity lookup, attachment storage
//! and rich-text rendering are supplied by the embedding application through
//! the traits in [`source`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use channel_export::{
//!     ChannelMessage, Collaborators, Config, ExportRequest, ExportService, InMemorySource,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = InMemorySource::new()
//!         .with_channel("general", "General")
//!         .with_messages(
//!             "general",
//!             vec![ChannelMessage {
//!                 id: "m1".into(),
//!                 sender_id: "alice".into(),
//!                 content: "hello".into(),
//!                 timestamp: 1_700_000_000_000,
//!                 ..Default::default()
//!             }],
//!         );
//!
//!     let service = ExportService::new(Config::default(), Collaborators::in_memory(source)).await?;
//!     service.start_worker().await;
//!
//!     // Subscribe to events
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     service
//!         .submit(ExportRequest {
//!             user_id: "u1".into(),
//!             channel_id: "general".into(),
//!             format: "html_viewer".into(),
//!             time_range: Default::default(),
//!             filters: Default::default(),
//!             options: Default::default(),
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Export rendering pipeline
pub mod export;
/// Download bandwidth limiting with a token bucket
pub mod rate_limiter;
/// Export service (decomposed into focused submodules)
pub mod service;
/// Collaborator traits and the in-memory implementation
pub mod source;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{
    ApiError, DatabaseError, Error, ErrorDetail, ExportError, Result, ToHttpStatus,
};
pub use export::{BasicRichText, RichTextRenderer, ViewerAssets};
pub use rate_limiter::RateLimiter;
pub use service::{Artifact, ExportService};
pub use source::{
    Attachment, AttachmentStore, ChannelDirectory, ChannelMessage, Collaborators, Identity,
    IdentityResolver, InMemorySource, MessageQuery, MessageSource,
};
pub use types::{
    Event, ExportFilters, ExportFormat, ExportJob, ExportOptions, ExportRequest, JobId,
    JobStatus, TimeRange,
};

/// Run the service until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT; if either handler cannot be
///   registered it waits on the other, then on `ctrl_c`.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// The worker finishes the job in flight before this returns.
///
/// # Example
///
/// ```no_run
/// use channel_export::{Collaborators, Config, ExportService, InMemorySource, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let collaborators = Collaborators::in_memory(InMemorySource::new());
///     let service = ExportService::new(Config::default(), collaborators).await?;
///     service.start_worker().await;
///
///     run_with_shutdown(service).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: ExportService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
