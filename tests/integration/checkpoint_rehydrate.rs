//! Integration tests for checkpoint selection, consumption, and rehydration

use crate::integration::test_utils::{temp_engine, HOUR_MS};
use serde_json::json;
use stackmemory::checkpoint::{CheckpointBudget, CheckpointReason, Consumption};
use stackmemory::concurrency::Deadline;
use stackmemory::context::ContextType;
use stackmemory::error::ApiError;
use stackmemory::types::{CheckpointId, ContextId};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_checkpoint_prefers_active_then_recent_closed_frames() {
    let (engine, clock) = temp_engine();
    let frames = engine.frames();
    let stale_closed = frames.start("ancient", "task", None).unwrap();
    frames.close(&stale_closed, json!(null)).unwrap();
    clock.advance(Duration::from_millis(48 * HOUR_MS));

    let recent_closed = frames.start("yesterday", "task", None).unwrap();
    frames.close(&recent_closed, json!(null)).unwrap();
    let aborted = frames.start("dead end", "task", None).unwrap();
    frames.abort(&aborted, "wrong approach").unwrap();
    clock.advance(Duration::from_secs(1));
    let active = frames.start("now", "task", None).unwrap();

    let id = engine
        .rehydration()
        .create_checkpoint(CheckpointReason::Manual, None, &Deadline::none())
        .unwrap();
    let checkpoint = engine.rehydration().get_checkpoint(&id).unwrap();
    let ids: Vec<_> = checkpoint.frames.iter().map(|f| f.id.clone()).collect();
    assert_eq!(ids, vec![active, recent_closed]);
}

#[test]
fn test_checkpoint_respects_byte_budget() {
    let (engine, _clock) = temp_engine();
    let frame = engine.frames().start("bulk", "task", None).unwrap();
    for i in 0..50 {
        engine
            .contexts()
            .add_context(
                ContextType::Observation,
                &format!("observation {} {}", i, "x".repeat(200)),
                &frame,
                None,
            )
            .unwrap();
    }

    let budget = CheckpointBudget {
        max_bytes: 2_048,
        ..CheckpointBudget::default()
    };
    let id = engine
        .rehydration()
        .create_checkpoint(CheckpointReason::Manual, Some(budget), &Deadline::none())
        .unwrap();
    let checkpoint = engine.rehydration().get_checkpoint(&id).unwrap();
    assert!(checkpoint.bytes_used <= 2_048);
    assert!(checkpoint.tokens_used <= budget.max_tokens);
    assert!(!checkpoint.contexts.is_empty());
    assert!(checkpoint.contexts.len() < 50);
}

#[test]
fn test_unusable_budget_is_rejected() {
    let (engine, _clock) = temp_engine();
    let budget = CheckpointBudget {
        max_bytes: 0,
        ..CheckpointBudget::default()
    };
    let result =
        engine
            .rehydration()
            .create_checkpoint(CheckpointReason::Manual, Some(budget), &Deadline::none());
    assert!(matches!(result, Err(ApiError::Validation(_))));
    assert!(engine.rehydration().list_checkpoints().unwrap().is_empty());
}

#[test]
fn test_new_checkpoint_supersedes_previous() {
    let (engine, clock) = temp_engine();
    let rehydration = engine.rehydration();
    let first = rehydration
        .create_checkpoint(CheckpointReason::Periodic, None, &Deadline::none())
        .unwrap();
    clock.advance(Duration::from_secs(1));
    let second = rehydration
        .create_checkpoint(CheckpointReason::PreClear, None, &Deadline::none())
        .unwrap();

    let state = rehydration.consumption(&first).unwrap().unwrap();
    assert_eq!(state.consumption, Consumption::Superseded { by: second.clone() });
    assert!(rehydration.consumption(&second).unwrap().is_none());

    let latest = rehydration.latest_checkpoint().unwrap().unwrap();
    assert_eq!(latest.id, second);
}

#[test]
fn test_rehydrate_latest_bumps_access_and_renders_text() {
    let (engine, clock) = temp_engine();
    let frame = engine.frames().start("auth refactor", "task", None).unwrap();
    let id = engine
        .contexts()
        .add_context(ContextType::Decision, "Sessions move to JWT", &frame, None)
        .unwrap();
    engine
        .rehydration()
        .create_checkpoint(CheckpointReason::PreClear, None, &Deadline::none())
        .unwrap();
    clock.advance(Duration::from_secs(10));

    let bundle = engine.rehydration().rehydrate(None, &Deadline::none()).unwrap();
    assert_eq!(bundle.reason, CheckpointReason::PreClear);
    assert_eq!(bundle.context_ids(), vec![id.clone()]);
    assert!(bundle.text.contains("auth refactor"));
    assert!(bundle.text.contains("Sessions move to JWT"));

    let item = engine.contexts().get_context(&id).unwrap();
    assert_eq!(item.access_count, 1);
}

#[test]
fn test_rehydrate_without_checkpoints_creates_one() {
    let (engine, _clock) = temp_engine();
    engine.frames().start("fresh", "task", None).unwrap();
    let bundle = engine.rehydration().rehydrate(None, &Deadline::none()).unwrap();
    assert_eq!(bundle.reason, CheckpointReason::Manual);
    assert_eq!(engine.rehydration().list_checkpoints().unwrap().len(), 1);
}

#[test]
fn test_rehydrate_unknown_checkpoint_is_not_found() {
    let (engine, _clock) = temp_engine();
    let result = engine
        .rehydration()
        .rehydrate(Some(&CheckpointId::from("ckp-missing")), &Deadline::none());
    assert!(matches!(result, Err(ApiError::NotFound { kind: "checkpoint", .. })));
}

#[test]
fn test_rehydrate_keeps_excerpts_of_pruned_items() {
    let (engine, clock) = temp_engine();
    let frame = engine.frames().start("t", "task", None).unwrap();
    let id = engine
        .contexts()
        .add_context(ContextType::Note, "ephemeral", &frame, None)
        .unwrap();
    let checkpoint = engine
        .rehydration()
        .create_checkpoint(CheckpointReason::Manual, None, &Deadline::none())
        .unwrap();
    engine.rehydration().mark_consumed(&checkpoint).unwrap();
    engine.rehydration().mark_consumed(&checkpoint).unwrap();
    clock.advance(Duration::from_secs(1));

    let report = engine
        .contexts()
        .prune_older_than(Duration::ZERO, &Default::default(), &Deadline::none())
        .unwrap();
    assert_eq!(report.removed, 1);

    let bundle = engine
        .rehydration()
        .rehydrate(Some(&checkpoint), &Deadline::none())
        .unwrap();
    assert_eq!(bundle.context_ids(), vec![id]);
    assert!(engine.contexts().get_context(&bundle.context_ids()[0]).is_err());
}

#[test]
fn test_concurrent_checkpoints_leave_one_unconsumed() {
    let (engine, _clock) = temp_engine();
    let engine = Arc::new(engine);
    let frame = engine.frames().start("parallel", "task", None).unwrap();
    engine
        .contexts()
        .add_context(ContextType::Task, "ship it", &frame, None)
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine
                    .rehydration()
                    .create_checkpoint(CheckpointReason::Periodic, None, &Deadline::none())
                    .unwrap()
            })
        })
        .collect();
    let ids: Vec<CheckpointId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let rehydration = engine.rehydration();
    assert_eq!(rehydration.list_checkpoints().unwrap().len(), 4);
    let unconsumed = ids
        .iter()
        .filter(|id| rehydration.consumption(id).unwrap().is_none())
        .count();
    assert_eq!(unconsumed, 1);
    for checkpoint in rehydration.list_checkpoints().unwrap() {
        let ids: Vec<&ContextId> = checkpoint.context_ids().collect();
        assert_eq!(ids.len(), 1);
    }
}
