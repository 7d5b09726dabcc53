//! Message body construction shared by every output format.

use regex::Regex;
use std::sync::LazyLock;

use super::payload::ExportMessage;

/// Converts stored rich-text content into one rendered unit
///
/// The host application owns the actual markup rules; the pipeline only needs
/// a plain-text and an HTML rendering of each body.
pub trait RichTextRenderer: Send + Sync {
    /// Flatten to plain text
    fn to_plain(&self, content: &str) -> String;

    /// Render to an HTML fragment (already escaped)
    fn to_html(&self, content: &str) -> String;
}

/// Minimal markdown-like renderer: `**bold**`, `*italic*`, `![alt](src)`
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicRichText;

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"!\[([^\]]*)\]\(([^)\s]+)\)"));
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\*\*([^*]+)\*\*"));
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\*([^*\s][^*]*)\*"));

/// Compile a hard-coded pattern
#[allow(clippy::expect_used)]
pub(crate) fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("hard-coded pattern compiles")
}

impl RichTextRenderer for BasicRichText {
    fn to_plain(&self, content: &str) -> String {
        let text = IMAGE_RE.replace_all(content, |caps: &regex::Captures<'_>| {
            if caps[1].is_empty() {
                "[image]".to_string()
            } else {
                format!("[image: {}]", &caps[1])
            }
        });
        let text = BOLD_RE.replace_all(&text, "$1");
        ITALIC_RE.replace_all(&text, "$1").into_owned()
    }

    fn to_html(&self, content: &str) -> String {
        let escaped = escape_html(content);
        let html = IMAGE_RE.replace_all(&escaped, r#"<img src="$2" alt="$1">"#);
        let html = BOLD_RE.replace_all(&html, "<strong>$1</strong>");
        let html = ITALIC_RE.replace_all(&html, "<em>$1</em>");
        html.replace('\n', "<br>")
    }
}

/// Escape text for use in HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Wrap out-of-character text in parentheses unless it already is
///
/// Full-width brackets are used when the text contains CJK characters.
pub fn wrap_ooc(text: &str) -> String {
    let trimmed = text.trim();
    if is_ooc_wrapped(trimmed) {
        return trimmed.to_string();
    }
    if trimmed.chars().any(is_cjk) {
        format!("（{trimmed}）")
    } else {
        format!("({trimmed})")
    }
}

fn is_ooc_wrapped(text: &str) -> bool {
    (text.starts_with('(') && text.ends_with(')'))
        || (text.starts_with('（') && text.ends_with('）'))
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30ff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{ac00}'..='\u{d7af}'
        | '\u{ff00}'..='\u{ffef}')
}

/// Output flavour of a message body
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyMode {
    /// Flattened text
    Plain,
    /// Escaped HTML with inline rich content
    Html,
}

/// Build the displayed body of a message
///
/// Reduces rich markup, wraps OOC text, prefixes archived and whisper
/// annotations and trims the result.
pub fn build_body(message: &ExportMessage, renderer: &dyn RichTextRenderer, mode: BodyMode) -> String {
    let raw = message.content.trim();
    let raw = if message.is_ooc {
        wrap_ooc(raw)
    } else {
        raw.to_string()
    };

    let mut body = match mode {
        BodyMode::Plain => renderer.to_plain(&raw),
        BodyMode::Html => renderer.to_html(&raw),
    };

    if message.is_whisper {
        let targets = message.whisper_to.join(", ");
        let note = if targets.is_empty() {
            "[whisper] ".to_string()
        } else {
            format!("[whisper to {targets}] ")
        };
        let note = match mode {
            BodyMode::Plain => note,
            BodyMode::Html => escape_html(&note),
        };
        body.insert_str(0, &note);
    }
    if message.is_archived {
        body.insert_str(0, "[archived] ");
    }

    body.trim().to_string()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> ExportMessage {
        ExportMessage {
            id: "m1".to_string(),
            sender_id: "alice".to_string(),
            sender_name: "Alice".to_string(),
            color: None,
            is_bot: false,
            timestamp: 0,
            is_ooc: false,
            is_whisper: false,
            whisper_to: Vec::new(),
            is_archived: false,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_basic_rich_text() {
        let r = BasicRichText;
        assert_eq!(r.to_plain("**hi** *there* ![map](attachment://a1)"), "hi there [image: map]");
        assert_eq!(
            r.to_html("**hi** <b>\nx ![](attachment://a1)"),
            r#"<strong>hi</strong> &lt;b&gt;<br>x <img src="attachment://a1" alt="">"#
        );
    }

    #[test]
    fn test_wrap_ooc() {
        assert_eq!(wrap_ooc(" brb "), "(brb)");
        assert_eq!(wrap_ooc("(brb)"), "(brb)");
        assert_eq!(wrap_ooc("稍等"), "（稍等）");
        assert_eq!(wrap_ooc("（稍等）"), "（稍等）");
    }

    #[test]
    fn test_build_body_annotations() {
        let mut m = message("  see you  ");
        m.is_whisper = true;
        m.whisper_to = vec!["Bob".to_string()];
        m.is_archived = true;
        assert_eq!(
            build_body(&m, &BasicRichText, BodyMode::Plain),
            "[archived] [whisper to Bob] see you"
        );

        let mut m = message("<ok>");
        m.is_ooc = true;
        assert_eq!(build_body(&m, &BasicRichText, BodyMode::Html), "(&lt;ok&gt;)");
    }
}
