//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the channel-export REST API using
//! utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the channel-export REST API
///
/// Served at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "channel-export REST API",
        version = "0.1.0",
        description = "Submit channel history exports, poll their progress and download the finished artifacts",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Exports
        crate::api::routes::create_export,
        crate::api::routes::list_exports,
        crate::api::routes::get_export,
        crate::api::routes::delete_export,
        crate::api::routes::retry_export,
        crate::api::routes::download_export,
        crate::api::routes::set_upload_info,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::ExportFormat,
        crate::types::TimeRange,
        crate::types::ExportFilters,
        crate::types::ExportOptions,
        crate::types::ExportRequest,
        crate::types::ExportJob,
        crate::types::Event,

        // API request/response types from routes
        crate::api::routes::ListExportsQuery,
        crate::api::routes::JobCreatedResponse,
        crate::api::routes::UploadInfoRequest,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "exports", description = "Export jobs - Submit, monitor, retry, delete and download exports"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_has_export_paths() {
        let spec = ApiDoc::openapi();

        for path in [
            "/exports",
            "/exports/{id}",
            "/exports/{id}/retry",
            "/exports/{id}/download",
            "/exports/{id}/upload",
            "/health",
            "/events",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn test_openapi_spec_has_components() {
        let spec = ApiDoc::openapi();

        let components = spec.components.expect("components defined");
        for schema in ["ExportJob", "ExportRequest", "Event", "ApiError"] {
            assert!(
                components.schemas.contains_key(schema),
                "missing schema {schema}"
            );
        }
    }

    #[test]
    fn test_openapi_spec_info_and_tags() {
        let spec = ApiDoc::openapi();

        assert_eq!(spec.info.title, "channel-export REST API");
        let tags: Vec<String> = spec
            .tags
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(tags, vec!["exports".to_string(), "system".to_string()]);
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = serde_json::to_value(ApiDoc::openapi()).expect("Should serialize to JSON");
        let version = json.get("openapi").and_then(|v| v.as_str()).unwrap();
        assert!(version.starts_with("3."), "Should use OpenAPI 3.x version");
    }
}
