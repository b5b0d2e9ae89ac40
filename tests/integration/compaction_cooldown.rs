//! Integration tests for compaction detection feeding rehydration

use crate::integration::test_utils::temp_engine_with;
use stackmemory::compaction::{classify, detect, IndicatorKind};
use stackmemory::config::StackConfig;
use stackmemory::context::ContextType;
use std::time::Duration;

#[test]
fn test_marker_variants_are_recognized() {
    let cases = [
        ("Previous Conversation Compacted", IndicatorKind::Literal),
        ("<compact-summary>work so far</compact-summary>", IndicatorKind::SummaryTag),
        ("## Summary of the conversation so far:", IndicatorKind::SummaryHeading),
        ("user typed /compact to free space", IndicatorKind::CompactCommand),
        ("[file content truncated after 400 lines]", IndicatorKind::FileReference),
    ];
    for (text, kind) in cases {
        let detection = classify(text);
        assert!(
            detection.indicators.iter().any(|i| i.kind == kind),
            "expected {:?} in {:?}",
            kind,
            text
        );
    }
    assert!(!detect("let's compact the array in place"));
    assert!(!detect(""));
}

#[test]
fn test_detection_rehydrates_once_per_cooldown_window() {
    let mut config = StackConfig::default();
    config.compaction.cooldown_secs = 60;
    let (engine, clock) = temp_engine_with(config);
    let frame = engine.frames().start("migration", "task", None).unwrap();
    engine
        .contexts()
        .add_context(ContextType::Decision, "Keep v1 endpoints until June", &frame, None)
        .unwrap();

    let first = engine.check_input("conversation was summarized").unwrap();
    assert!(first.outcome.triggered);
    let bundle = first.bundle.unwrap();
    assert!(bundle.text.contains("Keep v1 endpoints until June"));

    clock.advance(Duration::from_secs(59));
    let burst = engine.check_input("context truncated").unwrap();
    assert!(burst.outcome.suppressed);
    assert!(burst.bundle.is_none());

    clock.advance(Duration::from_secs(1));
    let later = engine.check_input("context truncated").unwrap();
    assert!(later.outcome.triggered);
    assert_eq!(later.bundle.unwrap().checkpoint_id, bundle.checkpoint_id);
}

#[test]
fn test_plain_text_does_not_start_cooldown() {
    let (engine, _clock) = temp_engine_with(StackConfig::default());
    let plain = engine.check_input("refactor the parser").unwrap();
    assert!(!plain.outcome.triggered && !plain.outcome.suppressed);
    assert!(engine.monitor().last_trigger().is_none());
    assert!(engine.rehydration().list_checkpoints().unwrap().is_empty());
}
