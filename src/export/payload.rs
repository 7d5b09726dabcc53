//! Format-independent export payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::source::{ChannelMessage, Identity, IdentityResolver};
use crate::types::{ExportFilters, TimeRange};

/// A message with its sender resolved for display
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportMessage {
    /// Message ID
    pub id: String,
    /// Sending account
    pub sender_id: String,
    /// Resolved display name
    pub sender_name: String,
    /// Name color as `#rrggbb`
    pub color: Option<String>,
    /// Bot-authored
    pub is_bot: bool,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Out-of-character
    pub is_ooc: bool,
    /// Whisper
    pub is_whisper: bool,
    /// Whisper recipients
    pub whisper_to: Vec<String>,
    /// Archived
    pub is_archived: bool,
    /// Rich-text body
    pub content: String,
}

impl ExportMessage {
    fn from_source(message: &ChannelMessage, identity: Identity) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: identity.display_name,
            color: identity.color,
            is_bot: message.is_bot,
            timestamp: message.timestamp,
            is_ooc: message.is_ooc,
            is_whisper: message.is_whisper,
            whisper_to: message.whisper_to.clone(),
            is_archived: message.is_archived,
            content: message.content.clone(),
        }
    }
}

/// Position of a payload within a multi-part export
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartBounds {
    /// One-based part number
    pub index: usize,
    /// Total number of parts
    pub count: usize,
    /// Timestamp of the first message in the part
    pub slice_start: Option<i64>,
    /// Timestamp of the last message in the part
    pub slice_end: Option<i64>,
}

/// Everything a formatter needs to render one export (or one part of it)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    /// Channel ID
    pub channel_id: String,
    /// Channel display name
    pub channel_name: String,
    /// Generation time
    pub generated_at: DateTime<Utc>,
    /// Requested time window
    pub time_range: TimeRange,
    /// Part position, `None` for single-file exports
    pub part: Option<PartBounds>,
    /// Filters the export was produced with
    pub filters: ExportFilters,
    /// Wrap plain-text lines in color markup
    pub colorize: bool,
    /// Opaque viewer display settings
    pub display_settings: serde_json::Value,
    /// Ordered messages
    pub messages: Vec<ExportMessage>,
}

/// Builds payloads for one job
///
/// Holds the job-wide fields once; each call resolves identities for a slice.
#[derive(Clone)]
pub struct PayloadBuilder {
    channel_id: String,
    channel_name: String,
    generated_at: DateTime<Utc>,
    time_range: TimeRange,
    filters: ExportFilters,
    colorize: bool,
    display_settings: serde_json::Value,
    identities: Arc<dyn IdentityResolver>,
}

impl PayloadBuilder {
    /// Builder for a channel export
    pub fn new(
        channel_id: impl Into<String>,
        channel_name: impl Into<String>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel_name: channel_name.into(),
            generated_at: Utc::now(),
            time_range: TimeRange::default(),
            filters: ExportFilters::default(),
            colorize: false,
            display_settings: serde_json::Value::Object(Default::default()),
            identities,
        }
    }

    /// Set the requested time window
    pub fn time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    /// Set the export filters
    pub fn filters(mut self, filters: ExportFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Enable color markup in plain text
    pub fn colorize(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    /// Set the viewer display settings
    pub fn display_settings(mut self, settings: serde_json::Value) -> Self {
        self.display_settings = settings;
        self
    }

    /// Generation time shared by every payload of the job
    pub fn generation_time(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Channel display name
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Channel ID
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Build a payload over `messages`
    pub async fn build(
        &self,
        messages: &[ChannelMessage],
        part: Option<PartBounds>,
    ) -> Result<ExportPayload> {
        let mut cache: HashMap<(&str, Option<&str>), Identity> = HashMap::new();
        let mut resolved = Vec::with_capacity(messages.len());

        for message in messages {
            let key = (message.sender_id.as_str(), message.identity_id.as_deref());
            let identity = match cache.get(&key) {
                Some(identity) => identity.clone(),
                None => {
                    let identity = self.identities.resolve(&self.channel_id, message).await?;
                    cache.insert(key, identity.clone());
                    identity
                }
            };
            resolved.push(ExportMessage::from_source(message, identity));
        }

        Ok(ExportPayload {
            channel_id: self.channel_id.clone(),
            channel_name: self.channel_name.clone(),
            generated_at: self.generated_at,
            time_range: self.time_range,
            part,
            filters: self.filters,
            colorize: self.colorize,
            display_settings: self.display_settings.clone(),
            messages: resolved,
        })
    }
}
