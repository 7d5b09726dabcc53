use std::io::Read;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::export::archive::{INDEX_ENTRY, MANIFEST_ENTRY, partial_path};
use crate::export::render::sha256_hex;
use crate::export::viewer::ViewerManifest;
use crate::service::test_helpers::{
    CHANNEL, create_test_service, create_test_service_from, create_test_service_with, request,
    sample_source,
};
use crate::source::{
    ChannelDirectory, ChannelMessage, Collaborators, InMemorySource, MessageQuery, MessageSource,
};
use crate::types::{Event, JobId, JobStatus};

/// Wait for `id` to finish; `Err` carries the failure message
async fn wait_for_outcome(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: JobId,
) -> std::result::Result<(), String> {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await.unwrap() {
                Event::JobCompleted { id: done, .. } if done == id => return Ok(()),
                Event::JobFailed { id: failed, error } if failed == id => return Err(error),
                _ => {}
            }
        }
    })
    .await
    .expect("worker did not finish the job in time")
}

/// Message store that panics for one channel and serves the rest from memory
struct PanickingSource {
    inner: InMemorySource,
    cursed: &'static str,
}

#[async_trait]
impl MessageSource for PanickingSource {
    async fn load_messages(
        &self,
        query: &MessageQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        if query.channel_id == self.cursed {
            panic!("message store corrupted");
        }
        self.inner.load_messages(query, offset, limit).await
    }
}

/// Channel registry that wipes the job table while the job runs
struct VanishingChannels {
    pool: Arc<OnceLock<SqlitePool>>,
}

#[async_trait]
impl ChannelDirectory for VanishingChannels {
    async fn channel_name(&self, _channel_id: &str) -> Result<Option<String>> {
        let pool = self.pool.get().unwrap();
        sqlx::query("DELETE FROM export_jobs").execute(pool).await.unwrap();
        Ok(Some("Gone".to_string()))
    }
}

fn read_entry(archive: &mut zip::ZipArchive<std::fs::File>, name: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    bytes
}

#[tokio::test]
async fn test_nothing_pending() {
    let (service, _temp_dir) = create_test_service().await;
    assert!(!service.process_next_job().await.unwrap());
}

#[tokio::test]
async fn test_viewer_job_end_to_end() {
    let (service, _temp_dir) = create_test_service().await;

    let mut req = request("html_viewer");
    req.options.slice_size = Some(5);
    req.options.max_concurrency = Some(2);
    let id = service.submit(req).await.unwrap();

    assert!(service.process_next_job().await.unwrap());

    let job = service.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Done, "{:?}", job.error_message);
    assert_eq!(job.progress, 100);
    assert!(job.finished_at.is_some());
    let path = job.file_path.unwrap();
    assert!(path.starts_with(service.get_config().export_dir()));
    assert!(job.file_name.unwrap().ends_with(".zip"));
    assert_eq!(job.file_size, Some(std::fs::metadata(&path).unwrap().len()));
    assert!(!partial_path(&path).exists());

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    let manifest: ViewerManifest =
        serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)).unwrap();

    assert_eq!(manifest.channel_id, CHANNEL);
    assert_eq!(manifest.channel_name, "The Tavern");
    assert_eq!(manifest.part_count, 3);
    assert_eq!(manifest.total_messages, 12);
    assert_eq!(manifest.slice_size, 5);
    assert_eq!(manifest.max_concurrency, 2);
    let counts: Vec<usize> = manifest.parts.iter().map(|p| p.message_count).collect();
    assert_eq!(counts, vec![5, 5, 2]);

    for (position, part) in manifest.parts.iter().enumerate() {
        assert_eq!(part.index, position + 1);
        let html = read_entry(&mut archive, &part.file_name);
        assert_eq!(sha256_hex(&html), part.sha256);
    }

    let first = String::from_utf8(read_entry(&mut archive, &manifest.parts[0].file_name)).unwrap();
    assert!(first.contains("Alice"));
    assert!(first.contains("line 1"));
    assert!(!first.contains("line 6"));

    let index = String::from_utf8(read_entry(&mut archive, INDEX_ENTRY)).unwrap();
    assert!(index.contains("viewer-manifest"));
    assert!(index.contains("parts/part-0003.html"));
}

#[tokio::test]
async fn test_viewer_job_over_empty_channel() {
    let (service, _temp_dir) = create_test_service_with(sample_source(0)).await;

    let id = service.submit(request("html_viewer")).await.unwrap();
    service.process_next_job().await.unwrap();

    let job = service.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Done);

    let path = job.file_path.unwrap();
    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    let manifest: ViewerManifest =
        serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)).unwrap();
    assert_eq!(manifest.part_count, 1);
    assert_eq!(manifest.parts[0].message_count, 0);
    assert_eq!(manifest.total_messages, 0);
}

#[tokio::test]
async fn test_viewer_job_reports_progress() {
    let (service, _temp_dir) = create_test_service().await;

    let mut req = request("html_viewer");
    req.options.slice_size = Some(4);
    let id = service.submit(req).await.unwrap();

    let mut events = service.subscribe();
    service.process_next_job().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(matches!(seen.first(), Some(Event::JobStarted { id: started }) if *started == id));
    let percents: Vec<u8> = seen
        .iter()
        .filter_map(|e| match e {
            Event::JobProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![33, 66, 99]);
    assert!(matches!(
        seen.last(),
        Some(Event::JobCompleted { id: done, .. }) if *done == id
    ));
}

#[tokio::test]
async fn test_json_job_flags_bot_dice() {
    let source = InMemorySource::new()
        .with_channel("dice", "Dice Room")
        .with_messages(
            "dice",
            vec![
                ChannelMessage {
                    id: "m1".to_string(),
                    sender_id: "DiceBot".to_string(),
                    is_bot: true,
                    content: "1d20+3 = 15".to_string(),
                    timestamp: 1_700_000_000_000,
                    ..Default::default()
                },
                ChannelMessage {
                    id: "m2".to_string(),
                    sender_id: "carol".to_string(),
                    content: "1d20+3 = 15".to_string(),
                    timestamp: 1_700_000_060_000,
                    ..Default::default()
                },
            ],
        );
    let (service, _temp_dir) = create_test_service_with(source).await;

    let mut req = request("json");
    req.channel_id = "dice".to_string();
    let id = service.submit(req).await.unwrap();
    service.process_next_job().await.unwrap();

    let job = service.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Done, "{:?}", job.error_message);

    let log: serde_json::Value =
        serde_json::from_slice(&std::fs::read(job.file_path.unwrap()).unwrap()).unwrap();
    let messages = log["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);

    assert_eq!(messages[0]["sender_id"], "dicebot");
    assert_eq!(messages[0]["timestamp"], 1_700_000_000);
    assert_eq!(messages[0]["is_dice"], true);
    assert_eq!(messages[0]["dice"]["command"], "1d20+3");
    assert_eq!(messages[0]["dice"]["result"], 15);

    assert_eq!(messages[1]["is_dice"], false);
}

#[tokio::test]
async fn test_text_job_merges_consecutive_messages() {
    let base = 1_700_000_000_000;
    let said = |id: &str, sender: &str, offset_s: i64, text: &str| ChannelMessage {
        id: id.to_string(),
        sender_id: sender.to_string(),
        content: text.to_string(),
        timestamp: base + offset_s * 1000,
        ..Default::default()
    };
    let source = InMemorySource::new().with_channel("c", "Chat").with_messages(
        "c",
        vec![
            said("m1", "alice", 0, "one"),
            said("m2", "alice", 10, "two"),
            said("m3", "alice", 20, "three"),
            said("m4", "bob", 30, "four"),
        ],
    );
    let (service, _temp_dir) = create_test_service_with(source).await;

    let mut req = request("txt");
    req.channel_id = "c".to_string();
    req.filters.merge_messages = true;
    req.filters.without_timestamp = true;
    let id = service.submit(req).await.unwrap();
    service.process_next_job().await.unwrap();

    let job = service.get_job(id).await.unwrap();
    let text = std::fs::read_to_string(job.file_path.unwrap()).unwrap();
    assert_eq!(text, "<alice> one\ntwo\nthree\n<bob> four\n");
}

#[tokio::test]
async fn test_unknown_channel_fails_job() {
    let (service, _temp_dir) = create_test_service().await;

    let mut req = request("txt");
    req.channel_id = "nowhere".to_string();
    let id = service.submit(req).await.unwrap();

    let mut events = service.subscribe();
    assert!(service.process_next_job().await.unwrap());

    let job = service.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.finished_at.is_some());
    assert!(job.file_path.is_none());
    let error = job.error_message.unwrap();
    assert!(error.contains("nowhere"), "{error}");

    let export_dir = service.get_config().export_dir().clone();
    assert_eq!(std::fs::read_dir(export_dir).unwrap().count(), 0);

    let mut failed = None;
    while let Ok(event) = events.try_recv() {
        if let Event::JobFailed { id: failed_id, error } = event {
            failed = Some((failed_id, error));
        }
    }
    assert_eq!(failed.map(|(failed_id, _)| failed_id), Some(id));
}

#[tokio::test]
async fn test_jobs_claimed_oldest_first() {
    let (service, _temp_dir) = create_test_service().await;

    let first = service.submit(request("txt")).await.unwrap();
    let second = service.submit(request("json")).await.unwrap();

    service.process_next_job().await.unwrap();
    assert_eq!(service.get_job(first).await.unwrap().status, JobStatus::Done);
    assert_eq!(service.get_job(second).await.unwrap().status, JobStatus::Pending);

    service.process_next_job().await.unwrap();
    assert_eq!(service.get_job(second).await.unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn test_started_worker_processes_submissions() {
    let (service, _temp_dir) = create_test_service().await;
    let mut events = service.subscribe();

    service.start_worker().await;
    let id = service.submit(request("html")).await.unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await.unwrap() {
                Event::JobCompleted { id: done, .. } if done == id => break,
                Event::JobFailed { error, .. } => panic!("job failed: {error}"),
                _ => {}
            }
        }
    })
    .await;
    assert!(completed.is_ok(), "worker did not complete the job in time");

    let html = std::fs::read_to_string(service.get_job(id).await.unwrap().file_path.unwrap())
        .unwrap();
    assert!(html.contains("line 12"));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_panicking_job_fails_and_worker_survives() {
    let source = sample_source(6).with_channel("cursed", "Cursed");
    let mut collaborators = Collaborators::in_memory(source.clone());
    collaborators.messages = Arc::new(PanickingSource {
        inner: source,
        cursed: "cursed",
    });
    let (service, _temp_dir) = create_test_service_from(collaborators).await;
    let mut events = service.subscribe();
    service.start_worker().await;

    let mut req = request("txt");
    req.channel_id = "cursed".to_string();
    let first = service.submit(req).await.unwrap();

    let error = wait_for_outcome(&mut events, first).await.unwrap_err();
    assert!(error.contains("panicked"), "{error}");
    assert!(error.contains("message store corrupted"), "{error}");

    let job = service.get_job(first).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.finished_at.is_some());

    let second = service.submit(request("txt")).await.unwrap();
    wait_for_outcome(&mut events, second).await.unwrap();
    assert_eq!(service.get_job(second).await.unwrap().status, JobStatus::Done);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_artifact_removed_when_job_row_vanishes() {
    let pool = Arc::new(OnceLock::new());
    let mut collaborators = Collaborators::in_memory(sample_source(4));
    collaborators.channels = Arc::new(VanishingChannels { pool: pool.clone() });
    let (service, _temp_dir) = create_test_service_from(collaborators).await;
    pool.set(service.db.pool().clone()).unwrap();

    let id = service.submit(request("txt")).await.unwrap();
    assert!(service.process_next_job().await.unwrap());

    assert!(service.db.get_job(id).await.unwrap().is_none());
    let export_dir = service.get_config().export_dir().clone();
    assert_eq!(std::fs::read_dir(export_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_worker_keeps_polling_after_store_errors() {
    let (service, _temp_dir) = create_test_service().await;
    let mut events = service.subscribe();

    sqlx::query("ALTER TABLE export_jobs RENAME TO export_jobs_offline")
        .execute(service.db.pool())
        .await
        .unwrap();
    assert!(service.process_next_job().await.is_err());

    service.start_worker().await;
    // Several ticks worth of failed claims
    tokio::time::sleep(Duration::from_millis(150)).await;
    {
        let handle = service.worker.handle.lock().await;
        assert!(!handle.as_ref().unwrap().is_finished());
    }

    sqlx::query("ALTER TABLE export_jobs_offline RENAME TO export_jobs")
        .execute(service.db.pool())
        .await
        .unwrap();

    let id = service.submit(request("json")).await.unwrap();
    wait_for_outcome(&mut events, id).await.unwrap();
    assert_eq!(service.get_job(id).await.unwrap().status, JobStatus::Done);

    service.shutdown().await.unwrap();
}
