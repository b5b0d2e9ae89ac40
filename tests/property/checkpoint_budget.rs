//! Property-based tests for budgeted checkpoint selection

use proptest::prelude::*;
use stackmemory::checkpoint::{
    estimate_tokens, select_entries, CheckpointBudget, ContextExcerpt, FrameSummary,
};
use stackmemory::checkpoint::select::snapshot_bytes;
use stackmemory::context::ContextType;
use stackmemory::frame::FrameState;
use stackmemory::types::{ContextId, FrameId};

fn frame(i: usize, digest_len: usize) -> FrameSummary {
    FrameSummary {
        id: FrameId::new(format!("frm-{i:04}")),
        parent_frame_id: None,
        depth: 0,
        name: format!("frame {i}"),
        frame_type: "task".to_string(),
        state: FrameState::Active,
        created_at: 1_700_000_000_000 + i as u64,
        closed_at: None,
        digest: (digest_len > 0).then(|| "d".repeat(digest_len)),
    }
}

fn excerpt(i: usize, len: usize) -> ContextExcerpt {
    ContextExcerpt {
        id: ContextId::new(format!("ctx-{i:04}")),
        context_type: ContextType::Note,
        frame_id: FrameId::new("frm-0000"),
        score: 1.0 / (i as f64 + 1.0),
        excerpt: "é".repeat(len),
    }
}

fn candidates() -> impl Strategy<Value = (Vec<FrameSummary>, Vec<ContextExcerpt>)> {
    (
        prop::collection::vec(0usize..400, 0..12),
        prop::collection::vec(0usize..400, 0..60),
    )
        .prop_map(|(frames, items)| {
            (
                frames.into_iter().enumerate().map(|(i, n)| frame(i, n)).collect(),
                items.into_iter().enumerate().map(|(i, n)| excerpt(i, n)).collect(),
            )
        })
}

fn budget() -> impl Strategy<Value = CheckpointBudget> {
    (64usize..20_000, 16usize..5_000, 0usize..12, 0usize..60).prop_map(
        |(max_bytes, max_tokens, max_frames, max_items)| CheckpointBudget {
            max_bytes,
            max_tokens,
            max_frames,
            max_items,
        },
    )
}

proptest! {
    /// The selected snapshot always fits the budget it was selected for.
    #[test]
    fn selection_never_exceeds_budget((frames, items) in candidates(), budget in budget()) {
        prop_assume!(budget.validate().is_ok());
        let selection = select_entries(&frames, &items, &budget);

        prop_assert!(selection.bytes_used <= budget.max_bytes);
        prop_assert!(selection.tokens_used <= budget.max_tokens);
        prop_assert!(selection.frames.len() <= budget.max_frames);
        prop_assert!(selection.contexts.len() <= budget.max_items);
        prop_assert_eq!(selection.bytes_used, snapshot_bytes(&selection.frames, &selection.contexts));
        prop_assert_eq!(selection.tokens_used, estimate_tokens(selection.bytes_used));
    }

    /// Selection keeps a prefix of each candidate list, in rank order.
    #[test]
    fn selection_is_a_prefix((frames, items) in candidates(), budget in budget()) {
        prop_assume!(budget.validate().is_ok());
        let selection = select_entries(&frames, &items, &budget);

        prop_assert_eq!(&selection.frames[..], &frames[..selection.frames.len()]);
        prop_assert_eq!(&selection.contexts[..], &items[..selection.contexts.len()]);
        if !selection.contexts.is_empty() {
            prop_assert_eq!(selection.frames.len(), frames.len().min(budget.max_frames));
        }
    }
}
