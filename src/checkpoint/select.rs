//! Greedy budget-bounded selection of checkpoint entries.

use crate::checkpoint::{estimate_tokens, CheckpointBudget, ContextExcerpt, FrameSummary};
use serde::Serialize;

/// Serialized shape whose size the budget bounds.
#[derive(Serialize)]
struct Snapshot<'a> {
    frames: &'a [FrameSummary],
    contexts: &'a [ContextExcerpt],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub frames: Vec<FrameSummary>,
    pub contexts: Vec<ContextExcerpt>,
    pub bytes_used: usize,
    pub tokens_used: usize,
    /// Selection stopped because the next entry would not fit.
    pub truncated: bool,
}

pub(crate) fn empty_snapshot_bytes() -> usize {
    snapshot_bytes(&[], &[])
}

/// Serialized length of a snapshot holding `frames` and `contexts`.
pub fn snapshot_bytes(frames: &[FrameSummary], contexts: &[ContextExcerpt]) -> usize {
    serde_json::to_vec(&Snapshot { frames, contexts })
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX)
}

/// Append candidates in rank order, frames first, while the snapshot fits.
///
/// Stops at the first entry that would overflow the byte or token budget.
/// The per-kind caps only end that kind's run.
pub fn select_entries(
    frames: &[FrameSummary],
    contexts: &[ContextExcerpt],
    budget: &CheckpointBudget,
) -> Selection {
    let mut bytes = empty_snapshot_bytes();
    let mut selection = Selection {
        frames: Vec::new(),
        contexts: Vec::new(),
        bytes_used: bytes,
        tokens_used: estimate_tokens(bytes),
        truncated: false,
    };

    for frame in frames.iter().take(budget.max_frames) {
        let added = entry_bytes(frame, selection.frames.is_empty());
        if !budget.fits(bytes.saturating_add(added)) {
            selection.truncated = true;
            break;
        }
        bytes += added;
        selection.frames.push(frame.clone());
    }

    if !selection.truncated {
        for context in contexts.iter().take(budget.max_items) {
            let added = entry_bytes(context, selection.contexts.is_empty());
            if !budget.fits(bytes.saturating_add(added)) {
                selection.truncated = true;
                break;
            }
            bytes += added;
            selection.contexts.push(context.clone());
        }
    }

    selection.bytes_used = snapshot_bytes(&selection.frames, &selection.contexts);
    debug_assert_eq!(selection.bytes_used, bytes);
    selection.tokens_used = estimate_tokens(selection.bytes_used);
    selection
}

/// Bytes an entry adds to a compact JSON array, including its separator.
fn entry_bytes<T: Serialize>(entry: &T, first: bool) -> usize {
    let len = serde_json::to_vec(entry)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX);
    if first {
        len
    } else {
        len.saturating_add(1)
    }
}
