//! REST API server demo
//!
//! Runs channel-export over an in-memory channel with the REST API enabled.
//!
//! After starting, you can:
//! - Submit an export via POST http://localhost:6790/exports
//! - Monitor jobs via GET http://localhost:6790/exports
//! - Download an artifact via GET http://localhost:6790/exports/1/download
//! - Stream events via GET http://localhost:6790/events
//!
//! Set `RUST_LOG=channel_export=debug` for verbose logging.

use std::sync::Arc;

use channel_export::config::{Config, DownloadConfig, ExportConfig};
use channel_export::{ChannelMessage, Collaborators, ExportService, Identity, InMemorySource};
use tracing_subscriber::EnvFilter;

const CHANNEL: &str = "tavern";

fn sample_source() -> InMemorySource {
    let start = 1_700_000_000_000;
    let messages: Vec<_> = (0..250)
        .map(|i| ChannelMessage {
            id: format!("m{i:04}"),
            sender_id: if i % 3 == 0 { "dicebot" } else { "alice" }.to_string(),
            is_bot: i % 3 == 0,
            content: if i % 3 == 0 {
                format!("1d20 = {}", i % 20 + 1)
            } else {
                format!("Alice says *hello* for the {i}th time")
            },
            timestamp: start + i * 60_000,
            is_ooc: i % 10 == 9,
            ..Default::default()
        })
        .collect();

    InMemorySource::new()
        .with_channel(CHANNEL, "The Tavern")
        .with_messages(CHANNEL, messages)
        .with_identity(
            "alice",
            Identity {
                display_name: "Alice".to_string(),
                color: Some("#aa3300".to_string()),
            },
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config {
        export: ExportConfig {
            export_dir: "exports".into(),
            ..Default::default()
        },
        download: DownloadConfig {
            rate_limit_bps: Some(512 * 1024),
            ..Default::default()
        },
        ..Default::default()
    };
    let bind_address = config.server.api.bind_address;

    let service = ExportService::new(config, Collaborators::in_memory(sample_source())).await?;
    service.start_worker().await;

    let api = Arc::new(service.clone()).spawn_api_server();

    println!("channel-export REST API listening on http://{bind_address}");
    println!();
    println!("Example commands:");
    println!("  # Export the demo channel as a paged HTML viewer");
    println!("  curl -X POST http://{bind_address}/exports \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!(
        "    -d '{{\"user_id\": \"demo\", \"channel_id\": \"{CHANNEL}\", \"format\": \"html_viewer\", \"options\": {{\"slice_size\": 50}}}}'"
    );
    println!();
    println!("  # List all exports");
    println!("  curl http://{bind_address}/exports");
    println!();
    println!("  # Download the first artifact");
    println!("  curl -OJ http://{bind_address}/exports/1/download");
    println!();
    println!("  # Stream events (Server-Sent Events)");
    println!("  curl -N http://{bind_address}/events");
    println!();
    println!("Press Ctrl+C to stop");

    channel_export::run_with_shutdown(service).await?;
    api.abort();

    Ok(())
}
