//! Merge pass over consecutive messages from the same speaker.

use std::time::Duration;

use super::content::wrap_ooc;
use crate::source::ChannelMessage;

/// Collapse runs of consecutive messages into single entries
///
/// Two neighbours merge when sender and identity match exactly, their OOC,
/// whisper and archived flags match, and the gap to the previous message of
/// the run is at most `window`. The merged entry keeps the first message's id
/// and timestamp. Single forward pass; order is preserved.
pub fn merge_messages(messages: Vec<ChannelMessage>, window: Duration) -> Vec<ChannelMessage> {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let mut merged: Vec<ChannelMessage> = Vec::with_capacity(messages.len());
    // Timestamp of the last message folded into the current run
    let mut run_last_ts = i64::MIN;

    for message in messages {
        if let Some(current) = merged.last_mut()
            && same_run(current, &message)
            && message.timestamp.saturating_sub(run_last_ts) <= window_ms
        {
            let mut body = current.content.trim_end().to_string();
            body.push('\n');
            body.push_str(&run_body(&message));
            current.content = body;
            run_last_ts = message.timestamp;
            continue;
        }

        run_last_ts = message.timestamp;
        let mut first = message;
        first.content = run_body(&first);
        merged.push(first);
    }

    merged
}

fn same_run(a: &ChannelMessage, b: &ChannelMessage) -> bool {
    a.sender_id == b.sender_id
        && a.identity_id == b.identity_id
        && a.is_ooc == b.is_ooc
        && a.is_whisper == b.is_whisper
        && a.is_archived == b.is_archived
}

fn run_body(message: &ChannelMessage) -> String {
    if message.is_ooc {
        wrap_ooc(&message.content)
    } else {
        message.content.clone()
    }
}
