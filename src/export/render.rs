//! Bounded-concurrency rendering of viewer parts.
//!
//! Every slice gets its own task. Tasks queue on a semaphore sized from the
//! job's concurrency setting, so at most that many render at once. Results land
//! in a slot per slice position, which keeps the output in source order no
//! matter which task finishes first.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::content::RichTextRenderer;
use super::formatter::render_messages_html;
use super::media::inline_media;
use super::partition::Slice;
use super::payload::{PartBounds, PayloadBuilder};
use super::viewer::{ManifestPart, ViewerAssets, part_file_name, render_part_page};
use crate::error::{Error, ExportError, Result};
use crate::source::AttachmentStore;

/// One slice handed to a render unit
#[derive(Clone, Debug)]
pub struct RenderUnit {
    /// The slice to render
    pub slice: Slice,
    /// Total number of parts in the job
    pub part_count: usize,
}

/// A rendered part page with its manifest entry
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedPart {
    /// Page bytes
    pub html: Vec<u8>,
    /// Manifest entry (file name, counts, bounds, digest)
    pub manifest: ManifestPart,
}

/// Renders a single slice
#[async_trait]
pub trait ChunkRender: Send + Sync {
    /// Render one unit into a part page
    async fn render(&self, unit: RenderUnit) -> Result<RenderedPart>;
}

/// Receives a call after each successfully rendered part
#[async_trait]
pub trait RenderProgress: Send + Sync {
    /// `done` of `total` parts have rendered
    async fn part_rendered(&self, done: usize, total: usize);
}

/// Progress sink that ignores updates
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

#[async_trait]
impl RenderProgress for NoProgress {
    async fn part_rendered(&self, _done: usize, _total: usize) {}
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Render every slice with at most `max_concurrency` units in flight
///
/// `max_concurrency` is clamped to `[1, global_max]`. The first failing unit
/// aborts the batch: its error is returned at once while units that are still
/// queued or running are left to finish in the background and their output is
/// discarded. A panicking unit is reported as a render failure of its part.
pub async fn render_parts(
    renderer: Arc<dyn ChunkRender>,
    slices: Vec<Slice>,
    max_concurrency: usize,
    global_max: usize,
    progress: &dyn RenderProgress,
) -> Result<Vec<RenderedPart>> {
    let total = slices.len();
    let permits = Arc::new(Semaphore::new(max_concurrency.clamp(1, global_max.max(1))));
    let mut tasks = JoinSet::new();
    let mut positions = HashMap::with_capacity(total);

    for (position, slice) in slices.into_iter().enumerate() {
        let renderer = Arc::clone(&renderer);
        let permits = Arc::clone(&permits);

        let handle = tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| {
                Error::Export(ExportError::RenderFailed {
                    part: position,
                    reason: format!("render pool closed: {e}"),
                })
            })?;
            renderer
                .render(RenderUnit {
                    slice,
                    part_count: total,
                })
                .await
                .map(|part| (position, part))
        });
        positions.insert(handle.id(), position);
    }

    let mut slots: Vec<Option<RenderedPart>> = (0..total).map(|_| None).collect();
    let mut done = 0;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((position, part))) => {
                slots[position] = Some(part);
                done += 1;
                progress.part_rendered(done, total).await;
            }
            Ok(Err(e)) => {
                tasks.detach_all();
                return Err(e);
            }
            Err(join_error) => {
                let part = positions.get(&join_error.id()).copied().unwrap_or_default();
                tasks.detach_all();
                return Err(ExportError::RenderFailed {
                    part,
                    reason: format!("render task failed: {join_error}"),
                }
                .into());
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(part, slot)| {
            slot.ok_or_else(|| {
                ExportError::RenderFailed {
                    part,
                    reason: "render unit produced no output".to_string(),
                }
                .into()
            })
        })
        .collect()
}

/// Production part renderer: payload, HTML fragment, optional media inlining, page
pub struct ViewerPartRenderer {
    builder: PayloadBuilder,
    rich_text: Arc<dyn RichTextRenderer>,
    attachments: Option<Arc<dyn AttachmentStore>>,
    assets: ViewerAssets,
    display_settings: serde_json::Value,
}

impl ViewerPartRenderer {
    /// Renderer for one job
    ///
    /// Pass `attachments` to inline media references as data URIs.
    pub fn new(
        builder: PayloadBuilder,
        rich_text: Arc<dyn RichTextRenderer>,
        attachments: Option<Arc<dyn AttachmentStore>>,
        assets: ViewerAssets,
        display_settings: serde_json::Value,
    ) -> Self {
        Self {
            builder,
            rich_text,
            attachments,
            assets,
            display_settings,
        }
    }
}

#[async_trait]
impl ChunkRender for ViewerPartRenderer {
    async fn render(&self, unit: RenderUnit) -> Result<RenderedPart> {
        let position = unit.slice.index;
        let index = position + 1;
        let failed = |reason: String| -> Error {
            ExportError::RenderFailed {
                part: position,
                reason,
            }
            .into()
        };

        let bounds = PartBounds {
            index,
            count: unit.part_count,
            slice_start: unit.slice.start,
            slice_end: unit.slice.end,
        };
        let payload = self
            .builder
            .build(&unit.slice.messages, Some(bounds))
            .await
            .map_err(|e| failed(format!("payload: {e}")))?;

        let mut fragment = render_messages_html(&payload, self.rich_text.as_ref());
        if let Some(store) = &self.attachments {
            fragment = inline_media(&fragment, store.as_ref()).await;
        }

        let page = render_part_page(
            self.builder.channel_name(),
            index,
            unit.part_count,
            &fragment,
            &self.display_settings,
            &self.assets,
        )
        .map_err(|e| failed(format!("template: {e}")))?;
        let html = page.into_bytes();

        Ok(RenderedPart {
            manifest: ManifestPart {
                file_name: part_file_name(index),
                index,
                part_count: unit.part_count,
                message_count: unit.slice.messages.len(),
                slice_start: unit.slice.start,
                slice_end: unit.slice.end,
                sha256: sha256_hex(&html),
            },
            html,
        })
    }
}
