//! Output format strategies for single-file exports.
//!
//! Each strategy turns one [`ExportPayload`] into a byte blob plus the content
//! type and extension it should be stored under. The multi-part viewer reuses
//! [`render_messages_html`] for its parts.

use chrono::DateTime;
use serde::Serialize;

use super::content::{BodyMode, RichTextRenderer, build_body, escape_html};
use super::dice::{DiceRoll, detect_dice};
use super::payload::{ExportMessage, ExportPayload, PartBounds};
use super::viewer::{ViewerAssets, render_page};
use crate::error::{ExportError, Result};
use crate::types::{ExportFormat, TimeRange};

/// Version of the structured log layout
pub const STRUCTURED_LOG_VERSION: u32 = 1;

/// Color used for colorized lines when the sender has none
const DEFAULT_TEXT_COLOR: &str = "#000000";

/// Rendered single-file output
#[derive(Clone, Debug, PartialEq)]
pub struct FormattedOutput {
    /// File content
    pub bytes: Vec<u8>,
    /// MIME type served on download
    pub content_type: &'static str,
    /// File extension without dot
    pub extension: &'static str,
}

/// A conversion strategy from payload to file content
pub trait Formatter: Send + Sync {
    /// Render a payload
    fn format(&self, payload: &ExportPayload, renderer: &dyn RichTextRenderer) -> Result<FormattedOutput>;
}

/// Pick the strategy for a single-file format
///
/// The viewer format has no single-file strategy and is rejected.
pub fn formatter_for(format: ExportFormat, assets: &ViewerAssets) -> Result<Box<dyn Formatter>> {
    match format {
        ExportFormat::Json => Ok(Box::new(StructuredLogFormatter)),
        ExportFormat::Text => Ok(Box::new(PlainTextFormatter)),
        ExportFormat::Html => Ok(Box::new(HtmlFormatter {
            assets: assets.clone(),
        })),
        ExportFormat::HtmlViewer => {
            Err(ExportError::UnsupportedFormat(format.as_str().to_string()).into())
        }
    }
}

/// Versioned structured log (`json`)
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuredLogFormatter;

#[derive(Serialize)]
struct StructuredLog<'a> {
    version: u32,
    channel: ChannelRef<'a>,
    generated_at: String,
    time_range: TimeRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    part: Option<PartBounds>,
    flags: &'a crate::types::ExportFilters,
    messages: Vec<StructuredRecord<'a>>,
}

#[derive(Serialize)]
struct ChannelRef<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct StructuredRecord<'a> {
    id: &'a str,
    sender_name: &'a str,
    sender_id: String,
    /// Epoch seconds
    timestamp: i64,
    body: String,
    is_ooc: bool,
    is_whisper: bool,
    is_archived: bool,
    is_dice: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    dice: Option<DiceRoll>,
}

/// Trimmed, lowercased sender ID used as a stable join key
fn normalize_sender_id(sender_id: &str) -> String {
    sender_id.trim().to_lowercase()
}

impl Formatter for StructuredLogFormatter {
    fn format(&self, payload: &ExportPayload, renderer: &dyn RichTextRenderer) -> Result<FormattedOutput> {
        let messages = payload
            .messages
            .iter()
            .map(|m| {
                let body = build_body(m, renderer, BodyMode::Plain);
                let dice = detect_dice(&body, m.is_bot);
                StructuredRecord {
                    id: &m.id,
                    sender_name: &m.sender_name,
                    sender_id: normalize_sender_id(&m.sender_id),
                    timestamp: m.timestamp.div_euclid(1000),
                    body,
                    is_ooc: m.is_ooc,
                    is_whisper: m.is_whisper,
                    is_archived: m.is_archived,
                    is_dice: dice.is_some(),
                    dice,
                }
            })
            .collect();

        let log = StructuredLog {
            version: STRUCTURED_LOG_VERSION,
            channel: ChannelRef {
                id: &payload.channel_id,
                name: &payload.channel_name,
            },
            generated_at: payload.generated_at.to_rfc3339(),
            time_range: payload.time_range,
            part: payload.part,
            flags: &payload.filters,
            messages,
        };

        Ok(FormattedOutput {
            bytes: serde_json::to_vec_pretty(&log)?,
            content_type: ExportFormat::Json.content_type(),
            extension: ExportFormat::Json.extension(),
        })
    }
}

/// Plain text, one entry per message (`txt`)
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextFormatter;

impl Formatter for PlainTextFormatter {
    fn format(&self, payload: &ExportPayload, renderer: &dyn RichTextRenderer) -> Result<FormattedOutput> {
        let mut out = String::new();
        for message in &payload.messages {
            let mut line = String::new();
            if !payload.filters.without_timestamp {
                line.push_str(&format!("[{}] ", format_timestamp(message.timestamp)));
            }
            line.push_str(&format!(
                "<{}> {}",
                message.sender_name,
                build_body(message, renderer, BodyMode::Plain)
            ));

            if payload.colorize {
                let color = css_color(message).unwrap_or(DEFAULT_TEXT_COLOR);
                out.push_str(&format!("[color={color}]{line}[/color]"));
            } else {
                out.push_str(&line);
            }
            out.push('\n');
        }

        Ok(FormattedOutput {
            bytes: out.into_bytes(),
            content_type: ExportFormat::Text.content_type(),
            extension: ExportFormat::Text.extension(),
        })
    }
}

/// Single HTML page (`html`)
#[derive(Clone, Debug, Default)]
pub struct HtmlFormatter {
    assets: ViewerAssets,
}

impl Formatter for HtmlFormatter {
    fn format(&self, payload: &ExportPayload, renderer: &dyn RichTextRenderer) -> Result<FormattedOutput> {
        let body = render_messages_html(payload, renderer);
        let page = render_page(&payload.channel_name, &self.assets, &body, "");

        Ok(FormattedOutput {
            bytes: page.into_bytes(),
            content_type: ExportFormat::Html.content_type(),
            extension: ExportFormat::Html.extension(),
        })
    }
}

/// Render the message list of a payload as an HTML fragment
pub fn render_messages_html(payload: &ExportPayload, renderer: &dyn RichTextRenderer) -> String {
    let mut html = String::from("<ol class=\"messages\">\n");

    for message in &payload.messages {
        let mut classes = vec!["msg"];
        if message.is_ooc {
            classes.push("ooc");
        }
        if message.is_whisper {
            classes.push("whisper");
        }
        if message.is_archived {
            classes.push("archived");
        }
        if message.is_bot {
            classes.push("bot");
        }

        html.push_str(&format!(
            "<li class=\"{}\" data-id=\"{}\">",
            classes.join(" "),
            escape_html(&message.id)
        ));
        if !payload.filters.without_timestamp {
            html.push_str(&format!(
                "<time data-ts=\"{}\">{}</time> ",
                message.timestamp,
                format_timestamp(message.timestamp)
            ));
        }
        match css_color(message) {
            Some(color) => html.push_str(&format!(
                "<span class=\"name\" style=\"color:{color}\">{}</span> ",
                escape_html(&message.sender_name)
            )),
            None => html.push_str(&format!(
                "<span class=\"name\">{}</span> ",
                escape_html(&message.sender_name)
            )),
        }
        html.push_str(&format!(
            "<span class=\"body\">{}</span></li>\n",
            build_body(message, renderer, BodyMode::Html)
        ));
    }

    html.push_str("</ol>\n");
    html
}

/// UTC `YYYY-MM-DD HH:MM:SS` for an epoch-millisecond timestamp
pub fn format_timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Sender color, only if it is a well-formed `#rrggbb`
fn css_color(message: &ExportMessage) -> Option<&str> {
    message.color.as_deref().filter(|c| {
        c.len() == 7 && c.starts_with('#') && c[1..].chars().all(|ch| ch.is_ascii_hexdigit())
    })
}
