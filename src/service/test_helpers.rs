//! Shared test helpers for creating ExportService instances in tests.

use std::time::Duration;

use tempfile::tempdir;

use crate::config::Config;
use crate::service::ExportService;
use crate::source::{ChannelMessage, Collaborators, Identity, InMemorySource};
use crate::types::{ExportFilters, ExportOptions, ExportRequest, TimeRange};

/// Channel registered by [`sample_source`]
pub(crate) const CHANNEL: &str = "tavern";

/// Test configuration rooted in `dir`, with small slice bounds and a fast tick
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.export.export_dir = dir.join("exports");
    config.export.poll_interval = Duration::from_millis(20);
    config.export.min_slice = 1;
    config.export.viewer_min_slice = 1;
    config
}

/// `count` messages from two alternating senders, one minute apart
pub(crate) fn messages(count: usize) -> Vec<ChannelMessage> {
    (0..count)
        .map(|i| ChannelMessage {
            id: format!("m{:03}", i + 1),
            sender_id: if i % 2 == 0 { "alice" } else { "bob" }.to_string(),
            content: format!("line {}", i + 1),
            timestamp: 1_700_000_000_000 + (i as i64) * 60_000,
            ..Default::default()
        })
        .collect()
}

/// In-memory source with one channel holding `count` messages
pub(crate) fn sample_source(count: usize) -> InMemorySource {
    InMemorySource::new()
        .with_channel(CHANNEL, "The Tavern")
        .with_messages(CHANNEL, messages(count))
        .with_identity(
            "alice",
            Identity {
                display_name: "Alice".to_string(),
                color: Some("#aa3300".to_string()),
            },
        )
}

/// Export request for the sample channel
pub(crate) fn request(format: &str) -> ExportRequest {
    ExportRequest {
        user_id: "u1".to_string(),
        channel_id: CHANNEL.to_string(),
        format: format.to_string(),
        time_range: TimeRange::default(),
        filters: ExportFilters::default(),
        options: ExportOptions::default(),
    }
}

/// Helper to create a test ExportService over `source`.
/// Returns the service and the tempdir (which must be kept alive).
pub(crate) async fn create_test_service_with(
    source: InMemorySource,
) -> (ExportService, tempfile::TempDir) {
    create_test_service_from(Collaborators::in_memory(source)).await
}

/// Helper to create a test ExportService over hand-assembled collaborators.
pub(crate) async fn create_test_service_from(
    collaborators: Collaborators,
) -> (ExportService, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let service = ExportService::new(config, collaborators).await.unwrap();
    (service, temp_dir)
}

/// Helper to create a test ExportService over a 12-message channel.
pub(crate) async fn create_test_service() -> (ExportService, tempfile::TempDir) {
    create_test_service_with(sample_source(12)).await
}
