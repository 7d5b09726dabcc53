//! Multi-part HTML viewer: page template, manifest and index page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::content::escape_html;
use crate::error::Result;

/// Version of the manifest layout
pub const MANIFEST_VERSION: u32 = 1;

/// Archive directory holding the part pages
pub const PARTS_DIR: &str = "parts";

/// Stylesheet and script embedded verbatim in every generated page
#[derive(Clone, Debug)]
pub struct ViewerAssets {
    /// CSS
    pub css: Cow<'static, str>,
    /// JavaScript
    pub js: Cow<'static, str>,
}

impl Default for ViewerAssets {
    fn default() -> Self {
        Self {
            css: Cow::Borrowed(include_str!("../../assets/viewer.css")),
            js: Cow::Borrowed(include_str!("../../assets/viewer.js")),
        }
    }
}

impl ViewerAssets {
    /// Custom assets
    pub fn new(css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            css: Cow::Owned(css.into()),
            js: Cow::Owned(js.into()),
        }
    }
}

/// One rendered part as listed in the manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPart {
    /// Path inside the archive, e.g. `parts/part-0001.html`
    pub file_name: String,
    /// One-based part number
    pub index: usize,
    /// Total number of parts
    pub part_count: usize,
    /// Messages in this part
    pub message_count: usize,
    /// Timestamp of the first message (epoch ms)
    pub slice_start: Option<i64>,
    /// Timestamp of the last message (epoch ms)
    pub slice_end: Option<i64>,
    /// Lowercase hex SHA-256 of the part file
    pub sha256: String,
}

/// Table of contents of a viewer archive
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewerManifest {
    /// Layout version
    pub version: u32,
    /// Channel ID
    pub channel_id: String,
    /// Channel display name
    pub channel_name: String,
    /// Generation time
    pub generated_at: DateTime<Utc>,
    /// Opaque display settings for the viewer script
    pub display_settings: serde_json::Value,
    /// Messages per part
    pub slice_size: usize,
    /// Render concurrency the archive was produced with
    pub max_concurrency: usize,
    /// Number of parts
    pub part_count: usize,
    /// Messages across all parts
    pub total_messages: usize,
    /// Parts in source order
    pub parts: Vec<ManifestPart>,
}

/// Archive path of part `index` (one-based)
pub fn part_file_name(index: usize) -> String {
    format!("{PARTS_DIR}/part-{index:04}.html")
}

/// Serialize a value for embedding inside a `<script>` element
pub fn script_json<T: Serialize>(value: &T) -> Result<String> {
    // `<` only occurs inside JSON strings, where the escape is equivalent
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}

/// Wrap a body fragment in a standalone page with the viewer assets
pub fn render_page(title: &str, assets: &ViewerAssets, body: &str, head_extra: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>\n{css}\n</style>\n{head_extra}</head>\n<body>\n\
         {body}<script>\n{js}\n</script>\n</body>\n</html>\n",
        title = escape_html(title),
        css = assets.css,
        js = assets.js,
    )
}

/// Page for one viewer part
///
/// `messages_html` is the rendered message list. Navigation links point at
/// the neighbouring parts and back to the index.
pub fn render_part_page(
    channel_name: &str,
    part: usize,
    part_count: usize,
    messages_html: &str,
    display_settings: &serde_json::Value,
    assets: &ViewerAssets,
) -> Result<String> {
    let mut nav = String::from("<nav class=\"parts\">");
    if part > 1 {
        nav.push_str(&format!(
            "<a rel=\"prev\" href=\"part-{:04}.html\">&larr;</a> ",
            part - 1
        ));
    }
    nav.push_str(&format!(
        "<a href=\"../index.html\">{part} / {part_count}</a>"
    ));
    if part < part_count {
        nav.push_str(&format!(
            " <a rel=\"next\" href=\"part-{:04}.html\">&rarr;</a>",
            part + 1
        ));
    }
    nav.push_str("</nav>\n");

    let body = format!(
        "<header><h1>{}</h1>{nav}</header>\n<main data-part=\"{part}\" data-part-count=\"{part_count}\">\n{messages_html}</main>\n{nav}",
        escape_html(channel_name),
    );
    let head = format!(
        "<script type=\"application/json\" id=\"display-settings\">{}</script>\n",
        script_json(display_settings)?
    );

    Ok(render_page(
        &format!("{channel_name} ({part}/{part_count})"),
        assets,
        &body,
        &head,
    ))
}

/// Index page listing every part, with the manifest embedded
pub fn render_index(manifest: &ViewerManifest, assets: &ViewerAssets) -> Result<String> {
    let mut list = String::from("<ol class=\"part-index\">\n");
    for part in &manifest.parts {
        let range = match (part.slice_start, part.slice_end) {
            (Some(start), Some(end)) => format!(
                " <time data-ts=\"{start}\"></time> &ndash; <time data-ts=\"{end}\"></time>"
            ),
            _ => String::new(),
        };
        list.push_str(&format!(
            "<li><a href=\"{}\">Part {}</a> ({} messages){range}</li>\n",
            escape_html(&part.file_name),
            part.index,
            part.message_count,
        ));
    }
    list.push_str("</ol>\n");

    let body = format!(
        "<header><h1>{}</h1><p>{} messages in {} parts, generated {}</p></header>\n<main>\n{list}</main>\n",
        escape_html(&manifest.channel_name),
        manifest.total_messages,
        manifest.part_count,
        manifest.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    let head = format!(
        "<script type=\"application/json\" id=\"viewer-manifest\">{}</script>\n",
        script_json(manifest)?
    );

    Ok(render_page(&manifest.channel_name, assets, &body, &head))
}
