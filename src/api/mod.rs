//! REST API server module
//!
//! Exposes export submission, status polling, listing, deletion, retry and
//! rate-limited artifact downloads, plus health, events and the OpenAPI document.

use crate::{Config, ExportService, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Exports
/// - `POST /exports` - Submit an export job
/// - `GET /exports` - List jobs (filter by `channel_id`, `user_id`, `status`)
/// - `GET /exports/:id` - Job status and progress
/// - `DELETE /exports/:id` - Delete job and artifact
/// - `POST /exports/:id/retry` - Queue a new job with the same parameters
/// - `GET /exports/:id/download` - Stream the artifact (rate limited)
/// - `PUT /exports/:id/upload` - Record the cloud upload location
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /events` - Server-sent events stream
pub fn create_router(service: Arc<ExportService>, config: Arc<Config>) -> Router {
    let state = AppState::new(service, config.clone());

    let router = Router::new()
        // Exports
        .route(
            "/exports",
            post(routes::create_export).get(routes::list_exports),
        )
        .route(
            "/exports/:id",
            get(routes::get_export).delete(routes::delete_export),
        )
        .route("/exports/:id/retry", post(routes::retry_export))
        .route("/exports/:id/download", get(routes::download_export))
        .route("/exports/:id/upload", put(routes::set_upload_info))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops or fails.
///
/// # Example
///
/// ```no_run
/// use channel_export::{Collaborators, Config, ExportService, InMemorySource};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let collaborators = Collaborators::in_memory(InMemorySource::new());
/// let service = Arc::new(ExportService::new((*config).clone(), collaborators).await?);
/// service.start_worker().await;
///
/// // Start API server (blocks until shutdown)
/// channel_export::api::start_api_server(service, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(service: Arc<ExportService>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(service, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
