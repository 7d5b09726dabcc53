//! Collaborator seams consumed by the export pipeline
//!
//! The pipeline never talks to a concrete message store, channel registry,
//! identity system or object store. It goes through these traits instead, which
//! lets a host application plug in its own backends. [`InMemorySource`] implements
//! all of them for tests and embedding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::export::{BasicRichText, RichTextRenderer, ViewerAssets};
use crate::types::{ExportFilters, TimeRange};

/// One stored channel message, as returned by a [`MessageSource`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID
    pub id: String,
    /// Account that sent the message
    pub sender_id: String,
    /// Character/persona the sender spoke as, if any
    #[serde(default)]
    pub identity_id: Option<String>,
    /// Name stored with the message, used when the resolver knows nothing better
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Sent by a bot account
    #[serde(default)]
    pub is_bot: bool,
    /// Rich-text body
    pub content: String,
    /// Send time, epoch milliseconds
    pub timestamp: i64,
    /// Out-of-character message
    #[serde(default)]
    pub is_ooc: bool,
    /// Whisper (private) message
    #[serde(default)]
    pub is_whisper: bool,
    /// Whisper recipients (display names)
    #[serde(default)]
    pub whisper_to: Vec<String>,
    /// Archived message
    #[serde(default)]
    pub is_archived: bool,
}

/// Message selection passed to [`MessageSource::load_messages`]
#[derive(Clone, Debug, PartialEq)]
pub struct MessageQuery {
    /// Channel to read
    pub channel_id: String,
    /// Inclusive time window
    pub time_range: TimeRange,
    /// Include out-of-character messages
    pub include_ooc: bool,
    /// Include archived messages
    pub include_archived: bool,
}

impl MessageQuery {
    /// Query for a channel with the given window and filters
    pub fn new(channel_id: impl Into<String>, time_range: TimeRange, filters: &ExportFilters) -> Self {
        Self {
            channel_id: channel_id.into(),
            time_range,
            include_ooc: filters.include_ooc,
            include_archived: filters.include_archived,
        }
    }

    /// Whether a message passes the window and flag filters
    pub fn matches(&self, message: &ChannelMessage) -> bool {
        self.time_range.contains(message.timestamp)
            && (self.include_ooc || !message.is_ooc)
            && (self.include_archived || !message.is_archived)
    }
}

/// Resolved display identity of a sender
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Name shown in the export
    pub display_name: String,
    /// Name color as `#rrggbb`
    pub color: Option<String>,
}

/// Stored attachment bytes
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    /// MIME type
    pub mime: String,
    /// Raw content
    pub bytes: Vec<u8>,
}

/// Channel message store
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Load one page of matching messages, ordered by timestamp then id
    ///
    /// A page shorter than `limit` marks the end of the result set.
    async fn load_messages(
        &self,
        query: &MessageQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>>;
}

/// Channel registry
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Display name of a channel, `None` if it does not exist
    async fn channel_name(&self, channel_id: &str) -> Result<Option<String>>;
}

/// Sender identity lookup
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve how a message sender is displayed
    async fn resolve(&self, channel_id: &str, message: &ChannelMessage) -> Result<Identity>;
}

/// Attachment/object storage
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Fetch an attachment by ID, `None` if it does not exist
    async fn fetch(&self, attachment_id: &str) -> Result<Option<Attachment>>;
}

/// Bundle of collaborators handed to the service
#[derive(Clone)]
pub struct Collaborators {
    /// Message store
    pub messages: Arc<dyn MessageSource>,
    /// Channel registry
    pub channels: Arc<dyn ChannelDirectory>,
    /// Identity lookup
    pub identities: Arc<dyn IdentityResolver>,
    /// Attachment storage
    pub attachments: Arc<dyn AttachmentStore>,
    /// Rich-text content transformation
    pub rich_text: Arc<dyn RichTextRenderer>,
    /// Stylesheet and script embedded in viewer pages
    pub assets: ViewerAssets,
}

impl Collaborators {
    /// Use one in-memory source for every lookup, with the default renderer and assets
    pub fn in_memory(source: InMemorySource) -> Self {
        let source = Arc::new(source);
        Self {
            messages: source.clone(),
            channels: source.clone(),
            identities: source.clone(),
            attachments: source,
            rich_text: Arc::new(BasicRichText),
            assets: ViewerAssets::default(),
        }
    }
}

/// In-memory implementation of every collaborator trait
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    channels: HashMap<String, String>,
    messages: HashMap<String, Vec<ChannelMessage>>,
    identities: HashMap<String, Identity>,
    attachments: HashMap<String, Attachment>,
}

impl InMemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel
    pub fn with_channel(mut self, channel_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.channels.insert(channel_id.into(), name.into());
        self
    }

    /// Add messages to a channel
    pub fn with_messages(
        mut self,
        channel_id: impl Into<String>,
        messages: impl IntoIterator<Item = ChannelMessage>,
    ) -> Self {
        let stored = self.messages.entry(channel_id.into()).or_default();
        stored.extend(messages);
        stored.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        self
    }

    /// Register an identity under a sender or identity ID
    pub fn with_identity(mut self, key: impl Into<String>, identity: Identity) -> Self {
        self.identities.insert(key.into(), identity);
        self
    }

    /// Store an attachment
    pub fn with_attachment(mut self, attachment_id: impl Into<String>, attachment: Attachment) -> Self {
        self.attachments.insert(attachment_id.into(), attachment);
        self
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn load_messages(
        &self,
        query: &MessageQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        Ok(self
            .messages
            .get(&query.channel_id)
            .map(|all| {
                all.iter()
                    .filter(|m| query.matches(m))
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ChannelDirectory for InMemorySource {
    async fn channel_name(&self, channel_id: &str) -> Result<Option<String>> {
        Ok(self.channels.get(channel_id).cloned())
    }
}

#[async_trait]
impl IdentityResolver for InMemorySource {
    async fn resolve(&self, _channel_id: &str, message: &ChannelMessage) -> Result<Identity> {
        let known = message
            .identity_id
            .as_ref()
            .and_then(|id| self.identities.get(id))
            .or_else(|| self.identities.get(&message.sender_id));

        Ok(known.cloned().unwrap_or_else(|| Identity {
            display_name: message
                .sender_name
                .clone()
                .unwrap_or_else(|| message.sender_id.clone()),
            color: None,
        }))
    }
}

#[async_trait]
impl AttachmentStore for InMemorySource {
    async fn fetch(&self, attachment_id: &str) -> Result<Option<Attachment>> {
        Ok(self.attachments.get(attachment_id).cloned())
    }
}
