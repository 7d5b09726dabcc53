//! Configuration types for channel-export

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Export pipeline configuration (artifact directory, worker tick, slicing bounds)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportConfig {
    /// Directory where finished artifacts are written (default: "./exports")
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Interval between job store polls when the worker is idle (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_millis_serde")]
    #[schema(value_type = u64)]
    pub poll_interval: Duration,

    /// Maximum gap between two messages of a merged run (default: 60 seconds)
    #[serde(default = "default_merge_window", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub merge_window: Duration,

    /// Lower bound for the page size of non-viewer formats (default: 100)
    #[serde(default = "default_min_slice")]
    pub min_slice: usize,

    /// Upper bound for the page size of non-viewer formats (default: 5000)
    #[serde(default = "default_max_slice")]
    pub max_slice: usize,

    /// Lower bound for viewer part size (default: 50)
    #[serde(default = "default_viewer_min_slice")]
    pub viewer_min_slice: usize,

    /// Hard upper bound for viewer part size (default: 2000)
    ///
    /// Kept separate from `max_slice`: a viewer part is rendered to a single
    /// HTML fragment and has to stay small enough for a browser to page through.
    #[serde(default = "default_viewer_max_slice")]
    pub viewer_max_slice: usize,

    /// Viewer part size used when a job does not set one (default: 500)
    #[serde(default = "default_viewer_slice")]
    pub default_viewer_slice: usize,

    /// Global ceiling for per-job render concurrency (default: 8)
    #[serde(default = "default_max_render_concurrency")]
    pub max_render_concurrency: usize,

    /// Render concurrency used when a job does not set one (default: 4)
    #[serde(default = "default_render_concurrency")]
    pub default_render_concurrency: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            poll_interval: default_poll_interval(),
            merge_window: default_merge_window(),
            min_slice: default_min_slice(),
            max_slice: default_max_slice(),
            viewer_min_slice: default_viewer_min_slice(),
            viewer_max_slice: default_viewer_max_slice(),
            default_viewer_slice: default_viewer_slice(),
            max_render_concurrency: default_max_render_concurrency(),
            default_render_concurrency: default_render_concurrency(),
        }
    }
}

/// Artifact download configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Global download rate limit in bytes per second (None = unlimited)
    #[serde(default)]
    pub rate_limit_bps: Option<u64>,

    /// Token bucket burst capacity in bytes (None = same as the rate)
    #[serde(default)]
    pub burst_bytes: Option<u64>,

    /// Size of each streamed body chunk in bytes (default: 64 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            rate_limit_bps: None,
            burst_bytes: None,
            chunk_size: default_chunk_size(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./channel-export.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Main configuration for [`ExportService`](crate::ExportService)
///
/// Fields are organized into logical sub-configs:
/// - [`export`](ExportConfig) - artifact directory, worker tick, slicing bounds
/// - [`download`](DownloadConfig) - rate limiting of artifact downloads
/// - [`persistence`](PersistenceConfig) - job database location
/// - [`server`](ServerIntegrationConfig) - REST API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Export pipeline settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Download throttling settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Job database settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Export directory
    pub fn export_dir(&self) -> &PathBuf {
        &self.export.export_dir
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let e = &self.export;
        if e.export_dir.as_os_str().is_empty() {
            return Err(Error::config("export_dir must not be empty", "export_dir"));
        }
        if e.min_slice == 0 || e.min_slice > e.max_slice {
            return Err(Error::config(
                format!("invalid slice bounds [{}, {}]", e.min_slice, e.max_slice),
                "min_slice",
            ));
        }
        if e.viewer_min_slice == 0 || e.viewer_min_slice > e.viewer_max_slice {
            return Err(Error::config(
                format!(
                    "invalid viewer slice bounds [{}, {}]",
                    e.viewer_min_slice, e.viewer_max_slice
                ),
                "viewer_min_slice",
            ));
        }
        if e.max_render_concurrency == 0 {
            return Err(Error::config(
                "max_render_concurrency must be at least 1",
                "max_render_concurrency",
            ));
        }
        if e.poll_interval.is_zero() {
            return Err(Error::config(
                "poll_interval must be greater than zero",
                "poll_interval",
            ));
        }
        if self.download.chunk_size == 0 {
            return Err(Error::config("chunk_size must be at least 1", "chunk_size"));
        }
        Ok(())
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_merge_window() -> Duration {
    Duration::from_secs(60)
}

fn default_min_slice() -> usize {
    100
}

fn default_max_slice() -> usize {
    5000
}

fn default_viewer_min_slice() -> usize {
    50
}

fn default_viewer_max_slice() -> usize {
    2000
}

fn default_viewer_slice() -> usize {
    500
}

fn default_max_render_concurrency() -> usize {
    8
}

fn default_render_concurrency() -> usize {
    4
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./channel-export.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
