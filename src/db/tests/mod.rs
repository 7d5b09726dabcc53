use crate::config::ExportConfig;
use crate::db::NewExportJob;
use crate::types::{ExportFilters, ExportFormat, ExportOptions, TimeRange};


/// A resolved pending job for `channel_id`
fn new_job(channel_id: &str, format: ExportFormat) -> NewExportJob {
    NewExportJob {
        user_id: "u1".to_string(),
        channel_id: channel_id.to_string(),
        format,
        time_range: TimeRange::default(),
        filters: ExportFilters::default(),
        options: ExportOptions::default()
            .resolve(format, &ExportConfig::default())
            .unwrap(),
    }
}
