//! Integration tests for capture, ranked queries, and the attention log

use crate::integration::test_utils::{disk_engine, temp_engine, temp_engine_with, HOUR_MS};
use stackmemory::clock::{Clock, ManualClock};
use stackmemory::config::StackConfig;
use stackmemory::concurrency::Deadline;
use stackmemory::context::{ContextFilter, ContextType, NewContext};
use stackmemory::error::ApiError;
use stackmemory::types::{ContextId, FrameId};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_capture_requires_existing_frame() {
    let (engine, _clock) = temp_engine();
    let result = engine.contexts().add_context(
        ContextType::Note,
        "orphan",
        &FrameId::from("frm-missing"),
        None,
    );
    assert!(matches!(result, Err(ApiError::Validation(_))));
    assert_eq!(engine.contexts().count(), 0);
}

#[test]
fn test_capture_rejects_blank_content_and_bad_importance() {
    let (engine, _clock) = temp_engine();
    let frame = engine.frames().start("task", "task", None).unwrap();
    let contexts = engine.contexts();

    assert!(matches!(
        contexts.add_context(ContextType::Note, "   ", &frame, None),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        contexts.add_context(ContextType::Note, "x", &frame, Some(1.5)),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        contexts.add_context(ContextType::Note, "x", &frame, Some(f64::NAN)),
        Err(ApiError::Validation(_))
    ));
}

#[test]
fn test_default_importance_follows_type() {
    let (engine, _clock) = temp_engine();
    let frame = engine.frames().start("task", "task", None).unwrap();
    let decision = engine
        .contexts()
        .add_context(ContextType::Decision, "Use sled", &frame, None)
        .unwrap();
    let note = engine
        .contexts()
        .add_context(ContextType::Note, "Lunch at noon", &frame, None)
        .unwrap();

    let decision = engine.contexts().get_context(&decision).unwrap();
    let note = engine.contexts().get_context(&note).unwrap();
    assert!(decision.importance > note.importance);
    assert_eq!(decision.importance, decision.base_importance);
}

#[test]
fn test_query_ranks_by_decayed_score_and_counts_access() {
    let (engine, clock) = temp_engine();
    let frame = engine.frames().start("task", "task", None).unwrap();
    let old = engine
        .contexts()
        .add_context(ContextType::Observation, "old observation", &frame, Some(0.9))
        .unwrap();
    clock.advance(Duration::from_millis(30 * 24 * HOUR_MS));
    let fresh = engine
        .contexts()
        .add_context(ContextType::Observation, "fresh observation", &frame, Some(0.5))
        .unwrap();

    let results = engine
        .contexts()
        .query_contexts(&ContextFilter::new().text("observation"), &Deadline::none())
        .unwrap();
    let ids: Vec<&ContextId> = results.iter().map(|item| &item.id).collect();
    assert_eq!(ids, vec![&fresh, &old]);
    assert!(results.iter().all(|item| item.access_count == 1));
    assert!(results.iter().all(|item| item.last_accessed == clock.now_ms()));

    let stored = engine.contexts().get_context(&old).unwrap();
    assert_eq!(stored.access_count, 1);
}

#[test]
fn test_query_filters_combine() {
    let (engine, _clock) = temp_engine();
    let frame = engine.frames().start("task", "task", None).unwrap();
    let other = engine.frames().start("other", "task", None).unwrap();
    let contexts = engine.contexts();
    let wanted = contexts
        .add(
            NewContext::new(ContextType::Error, "Linker failed on arm64", frame.clone())
                .tag("build"),
        )
        .unwrap();
    contexts
        .add(NewContext::new(ContextType::Error, "Linker failed on x86", other.clone()).tag("build"))
        .unwrap();
    contexts
        .add(NewContext::new(ContextType::Note, "Linker notes", frame.clone()).tag("build"))
        .unwrap();

    let filter = ContextFilter::in_frame(frame)
        .of_type(ContextType::Error)
        .with_tag("build")
        .text("LINKER arm64");
    let results = contexts.query_contexts(&filter, &Deadline::none()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, wanted);
}

#[test]
fn test_expired_deadline_fails_query_without_side_effects() {
    let (engine, _clock) = temp_engine();
    let frame = engine.frames().start("task", "task", None).unwrap();
    let id = engine
        .contexts()
        .add_context(ContextType::Note, "something", &frame, None)
        .unwrap();

    let expired = Deadline::after(Duration::ZERO);
    std::thread::sleep(Duration::from_millis(2));
    let result = engine.contexts().query_contexts(&ContextFilter::new(), &expired);
    assert!(matches!(result, Err(ApiError::DeadlineExceeded { .. })));
    assert_eq!(engine.contexts().get_context(&id).unwrap().access_count, 0);
}

#[test]
fn test_recall_logs_query_patterns() {
    let (engine, clock) = temp_engine();
    let frame = engine.frames().start("task", "task", None).unwrap();
    engine
        .contexts()
        .add_context(ContextType::Decision, "Retry with backoff", &frame, None)
        .unwrap();

    let attention = engine.attention();
    assert_eq!(attention.record_query("retry", &Deadline::none()).unwrap().len(), 1);
    clock.advance(Duration::from_secs(1));
    attention.record_query("  RETRY ", &Deadline::none()).unwrap();
    attention.record_query("nothing matches", &Deadline::none()).unwrap();
    assert!(attention.record_query("   ", &Deadline::none()).unwrap().is_empty());

    assert_eq!(attention.count(), 4);
    let patterns = attention
        .pattern_frequency(Duration::from_secs(3600), 10)
        .unwrap();
    assert_eq!(patterns[0].pattern, "retry");
    assert_eq!(patterns[0].count, 2);
}

#[test]
fn test_items_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(1_700_000_000_000);
    let id = {
        let engine = disk_engine(&dir, &clock);
        let frame = engine.frames().start("task", "task", None).unwrap();
        let id = engine
            .contexts()
            .add_context(ContextType::Insight, "sled survives restarts", &frame, None)
            .unwrap();
        engine.flush().unwrap();
        id
    };

    let engine = disk_engine(&dir, &clock);
    let item = engine.contexts().get_context(&id).unwrap();
    assert_eq!(item.content, "sled survives restarts");
}

#[test]
fn test_recompute_decay_updates_stored_importance() {
    let (engine, clock) = temp_engine();
    let frame = engine.frames().start("task", "task", None).unwrap();
    let id = engine
        .contexts()
        .add_context(ContextType::Decision, "Adopt trunk-based flow", &frame, Some(0.8))
        .unwrap();
    clock.advance(Duration::from_millis(7 * 24 * HOUR_MS));

    let report = engine.recompute_decay(&Deadline::none()).unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.updated, 1);
    assert!(!report.interrupted);

    let item = engine.contexts().get_context(&id).unwrap();
    assert!((item.importance - 0.4).abs() < 1e-9);
    assert_eq!(item.base_importance, 0.8);

    let again = engine.recompute_decay(&Deadline::none()).unwrap();
    assert_eq!(again.updated, 0);
}

#[test]
fn test_interrupted_recompute_keeps_finished_batches_only() {
    let mut config = StackConfig::default();
    config.decay.batch_size = 1;
    let (engine, clock) = temp_engine_with(config);
    let frame = engine.frames().start("task", "task", None).unwrap();
    let ids: Vec<ContextId> = (0..3)
        .map(|n| {
            engine
                .contexts()
                .add_context(ContextType::Note, &format!("note {n}"), &frame, Some(0.8))
                .unwrap()
        })
        .collect();
    clock.advance(Duration::from_millis(7 * 24 * HOUR_MS));

    // One poll passes, so exactly one batch runs before the sweep stops.
    let report = engine.recompute_decay(&Deadline::after_polls(1)).unwrap();
    assert!(report.interrupted);
    assert_eq!(report.batches, 1);
    assert_eq!(report.updated, 1);

    // Batches follow key order, so the smallest id is the one rewritten.
    let first = ids.iter().min().unwrap();
    for id in &ids {
        let item = engine.contexts().get_context(id).unwrap();
        if id == first {
            assert!((item.importance - 0.4).abs() < 1e-9);
        } else {
            assert_eq!(item.importance, 0.8);
        }
    }

    let rest = engine.recompute_decay(&Deadline::none()).unwrap();
    assert!(!rest.interrupted);
    assert_eq!(rest.updated, 2);
}
