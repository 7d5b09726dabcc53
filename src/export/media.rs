//! Inline attachment references as data URIs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::content::pattern;
use crate::source::AttachmentStore;

/// Attachments larger than this stay as references
pub const MAX_INLINE_BYTES: usize = 8 * 1024 * 1024;

static ATTACHMENT_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"src="attachment://([A-Za-z0-9._\-]+)""#));

/// Replace `src="attachment://<id>"` references with `data:` URIs
///
/// Missing, oversized or failing attachments are left untouched and logged;
/// inlining never fails the render.
pub async fn inline_media(html: &str, store: &dyn AttachmentStore) -> String {
    let mut resolved: HashMap<String, Option<String>> = HashMap::new();

    let ids: Vec<String> = ATTACHMENT_SRC_RE
        .captures_iter(html)
        .map(|caps| caps[1].to_string())
        .collect();

    for id in ids {
        if resolved.contains_key(&id) {
            continue;
        }

        let data_uri = match store.fetch(&id).await {
            Ok(Some(attachment)) if attachment.bytes.len() <= MAX_INLINE_BYTES => Some(format!(
                "data:{};base64,{}",
                attachment.mime,
                STANDARD.encode(&attachment.bytes)
            )),
            Ok(Some(attachment)) => {
                tracing::warn!(
                    attachment_id = %id,
                    size = attachment.bytes.len(),
                    "Attachment too large to inline, keeping reference"
                );
                None
            }
            Ok(None) => {
                tracing::warn!(attachment_id = %id, "Attachment not found, keeping reference");
                None
            }
            Err(e) => {
                tracing::warn!(attachment_id = %id, error = %e, "Failed to fetch attachment, keeping reference");
                None
            }
        };
        resolved.insert(id, data_uri);
    }

    ATTACHMENT_SRC_RE
        .replace_all(html, |caps: &regex::Captures<'_>| {
            match resolved.get(&caps[1]).and_then(|uri| uri.as_deref()) {
                Some(uri) => format!("src=\"{uri}\""),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
