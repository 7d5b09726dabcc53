//! Fixed-size slicing of an ordered message list.

use crate::source::ChannelMessage;

/// One contiguous slice of messages
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    /// Zero-based position
    pub index: usize,
    /// Messages in source order
    pub messages: Vec<ChannelMessage>,
    /// Timestamp of the first message
    pub start: Option<i64>,
    /// Timestamp of the last message
    pub end: Option<i64>,
}

/// Clamp a requested slice size into `[min, max]`
pub fn clamp_slice_size(requested: usize, min: usize, max: usize) -> usize {
    requested.clamp(min.max(1), max.max(min).max(1))
}

/// Split messages into consecutive slices of `size`
///
/// Every slice but the last holds exactly `size` messages. An empty input
/// still yields one empty slice so that a viewer always has a first part.
pub fn partition(messages: Vec<ChannelMessage>, size: usize) -> Vec<Slice> {
    let size = size.max(1);
    if messages.is_empty() {
        return vec![Slice {
            index: 0,
            messages: Vec::new(),
            start: None,
            end: None,
        }];
    }

    let mut slices = Vec::with_capacity(messages.len().div_ceil(size));
    let mut rest = messages.into_iter().peekable();
    while rest.peek().is_some() {
        let chunk: Vec<ChannelMessage> = rest.by_ref().take(size).collect();
        slices.push(Slice {
            index: slices.len(),
            start: chunk.first().map(|m| m.timestamp),
            end: chunk.last().map(|m| m.timestamp),
            messages: chunk,
        });
    }
    slices
}
