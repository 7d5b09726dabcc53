//! Artifact downloads through the REST API under the global rate limiter

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use channel_export::api::create_router;
use common::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

const RATE: u64 = 100_000;
const BURST: u64 = 20_000;

#[tokio::test]
async fn test_download_is_throttled() {
    let (service, _temp_dir) = start_service_with(campaign_source(3000), |config| {
        config.download.rate_limit_bps = Some(RATE);
        config.download.burst_bytes = Some(BURST);
        config.download.chunk_size = 8 * 1024;
    })
    .await;

    let (id, result) = run_job(&service, export_request("txt")).await;
    assert_eq!(result, WaitResult::Completed);

    let size = service
        .get_job(id)
        .await
        .expect("job exists")
        .file_size
        .expect("file size");
    assert!(size > 2 * BURST, "artifact too small to throttle: {size}");

    let config = service.get_config();
    let service = Arc::new(service);
    let app = create_router(service, config);

    let started = Instant::now();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let elapsed = started.elapsed();

    assert_eq!(body.len() as u64, size);

    // Everything past the initial burst is paced at RATE bytes per second
    let minimum = Duration::from_secs_f64((size - BURST) as f64 / RATE as f64);
    assert!(
        elapsed >= minimum.mul_f64(0.9),
        "download of {size} bytes took {elapsed:?}, expected at least {minimum:?}"
    );
}

#[tokio::test]
async fn test_unlimited_download_is_immediate() {
    let (service, _temp_dir) = start_service(campaign_source(200)).await;

    let (id, result) = run_job(&service, export_request("html")).await;
    assert_eq!(result, WaitResult::Completed);

    let config = service.get_config();
    assert!(config.download.rate_limit_bps.is_none());
    let app = create_router(Arc::new(service), config);

    let started = Instant::now();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");

    assert!(started.elapsed() < Duration::from_secs(2));
}
