//! Export rendering pipeline
//!
//! Everything between loaded messages and a finished artifact on disk:
//! - [`merge`] - collapse consecutive messages from one speaker
//! - [`payload`] - format-independent payloads with resolved identities
//! - [`formatter`] - single-file strategies (structured log, plain text, HTML)
//! - [`partition`] - fixed-size slicing for the viewer
//! - [`render`] - bounded-concurrency part rendering
//! - [`viewer`] - viewer page template, manifest and index page
//! - [`archive`] - partial-then-rename artifact writers and the zip assembler

pub mod archive;
pub mod content;
pub mod dice;
pub mod formatter;
pub mod media;
pub mod merge;
pub mod partition;
pub mod payload;
pub mod render;
pub mod viewer;

pub use content::{BasicRichText, RichTextRenderer};
pub use formatter::{FormattedOutput, Formatter, formatter_for};
pub use payload::{ExportMessage, ExportPayload, PartBounds, PayloadBuilder};
pub use render::{ChunkRender, RenderProgress, RenderedPart, render_parts};
pub use viewer::{ManifestPart, ViewerAssets, ViewerManifest};
