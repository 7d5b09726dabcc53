//! Channel fixtures and service constructors

use channel_export::{
    ChannelMessage, Collaborators, Config, ExportFilters, ExportOptions, ExportRequest,
    ExportService, Identity, InMemorySource,
};
use std::time::Duration;
use tempfile::TempDir;

/// Channel used by every fixture
pub const CHANNEL: &str = "campaign-1";

/// `count` messages cycling through a narrator, two players and a dice bot
pub fn campaign_messages(count: usize) -> Vec<ChannelMessage> {
    (0..count)
        .map(|i| {
            let (sender, is_bot, content) = match i % 4 {
                0 => ("narrator", false, format!("The story continues ({i})")),
                1 => ("p-alice", false, format!("Alice acts *carefully* ({i})")),
                2 => ("dicebot", true, format!("1d20+{} = {}", i % 5, 10 + i % 5)),
                _ => ("p-bob", false, format!("Bob answers ({i})")),
            };
            ChannelMessage {
                id: format!("msg-{i:05}"),
                sender_id: sender.to_string(),
                is_bot,
                content,
                timestamp: 1_700_000_000_000 + (i as i64) * 90_000,
                is_ooc: i % 7 == 6,
                ..Default::default()
            }
        })
        .collect()
}

/// In-memory collaborators holding `count` campaign messages
pub fn campaign_source(count: usize) -> InMemorySource {
    InMemorySource::new()
        .with_channel(CHANNEL, "Campaign One")
        .with_messages(CHANNEL, campaign_messages(count))
        .with_identity(
            "p-alice",
            Identity {
                display_name: "Alice the Bold".to_string(),
                color: Some("#3366ff".to_string()),
            },
        )
}

/// Test configuration with all state inside `dir`
pub fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("exports.db");
    config.export.export_dir = dir.join("exports");
    config.export.poll_interval = Duration::from_millis(20);
    config.export.viewer_min_slice = 1;
    config.export.min_slice = 1;
    config
}

/// Service over `source` with `config`, worker started
///
/// Returns the service and the tempdir (which must be kept alive).
pub async fn start_service_with(
    source: InMemorySource,
    configure: impl FnOnce(&mut Config),
) -> (ExportService, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(temp_dir.path());
    configure(&mut config);
    let service = ExportService::new(config, Collaborators::in_memory(source))
        .await
        .expect("Failed to create service");
    service.start_worker().await;
    (service, temp_dir)
}

/// Service over `source` with the test configuration, worker started
pub async fn start_service(source: InMemorySource) -> (ExportService, TempDir) {
    start_service_with(source, |_| {}).await
}

/// Request for the fixture channel
pub fn export_request(format: &str) -> ExportRequest {
    ExportRequest {
        user_id: "gm".to_string(),
        channel_id: CHANNEL.to_string(),
        format: format.to_string(),
        time_range: Default::default(),
        filters: ExportFilters::default(),
        options: ExportOptions::default(),
    }
}
