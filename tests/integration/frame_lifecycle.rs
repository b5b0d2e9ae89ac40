//! Integration tests for frame lifecycle, navigation, and the stale sweep

use crate::integration::test_utils::{temp_engine, HOUR_MS};
use serde_json::json;
use stackmemory::concurrency::Deadline;
use stackmemory::context::{ContextType, NewContext};
use stackmemory::error::ApiError;
use stackmemory::frame::FrameState;
use stackmemory::types::FrameId;
use std::time::Duration;

#[test]
fn test_nested_frames_track_depth_and_ancestry() {
    let (engine, _clock) = temp_engine();
    let frames = engine.frames();
    let root = frames.start("release", "task", None).unwrap();
    let child = frames.start("build", "subtask", Some(&root)).unwrap();
    let grandchild = frames.start("link", "tool_call", Some(&child)).unwrap();

    assert_eq!(frames.get(&grandchild).unwrap().depth, 2);
    let path: Vec<FrameId> = frames
        .ancestors(&grandchild)
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(path, vec![root.clone(), child.clone(), grandchild]);

    let children = frames.children(&root).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, child);
}

#[test]
fn test_start_under_unknown_parent_fails() {
    let (engine, _clock) = temp_engine();
    let result = engine
        .frames()
        .start("orphan", "task", Some(&FrameId::from("frm-nope")));
    assert!(matches!(result, Err(ApiError::NotFound { kind: "frame", .. })));
    assert_eq!(engine.frames().count(), 0);
}

#[test]
fn test_close_computes_digest_from_ranked_items() {
    let (engine, clock) = temp_engine();
    let frame = engine.frames().start("debug linker", "task", None).unwrap();
    engine
        .contexts()
        .add_context(ContextType::Note, "tried clean build", &frame, Some(0.2))
        .unwrap();
    engine
        .contexts()
        .add_context(ContextType::Decision, "pin lld to 17", &frame, Some(0.9))
        .unwrap();
    clock.advance(Duration::from_secs(60));

    let closed = engine
        .frames()
        .close(&frame, json!({"resolved": true}))
        .unwrap();
    assert_eq!(closed.state, FrameState::Closed);
    assert!(closed.closed_at.is_some());
    assert_eq!(closed.outputs, Some(json!({"resolved": true})));

    let text = closed.digest_text.unwrap();
    let decision = text.find("pin lld to 17").unwrap();
    let note = text.find("tried clean build").unwrap();
    assert!(decision < note);

    let digest = closed.digest_json.unwrap();
    assert_eq!(digest["item_count"], 2);
    assert_eq!(digest["by_type"]["decision"], 1);
    assert_eq!(digest["outputs"]["resolved"], true);
}

#[test]
fn test_close_empty_frame_still_has_digest() {
    let (engine, _clock) = temp_engine();
    let frame = engine.frames().start("quiet", "task", None).unwrap();
    let closed = engine.frames().close(&frame, json!(null)).unwrap();
    assert!(closed.digest_text.unwrap().contains("no context captured"));
}

#[test]
fn test_terminal_transitions() {
    let (engine, _clock) = temp_engine();
    let frames = engine.frames();
    let closed = frames.start("a", "task", None).unwrap();
    frames.close(&closed, json!(null)).unwrap();
    assert!(matches!(frames.close(&closed, json!(null)), Err(ApiError::Validation(_))));
    assert!(matches!(frames.abort(&closed, "late"), Err(ApiError::Validation(_))));

    let aborted = frames.start("b", "task", None).unwrap();
    let first = frames.abort(&aborted, "user cancelled").unwrap();
    let again = frames.abort(&aborted, "second reason").unwrap();
    assert_eq!(first, again);
    assert_eq!(again.abort_reason.as_deref(), Some("user cancelled"));
    assert!(matches!(frames.close(&aborted, json!(null)), Err(ApiError::Validation(_))));
}

#[test]
fn test_stale_sweep_reports_without_mutating() {
    let (engine, clock) = temp_engine();
    let frames = engine.frames();
    let old = frames.start("forgotten", "task", None).unwrap();
    clock.advance(Duration::from_millis(30 * HOUR_MS));
    let recent = frames.start("current", "task", None).unwrap();
    let done = frames.start("done", "task", None).unwrap();
    frames.close(&done, json!(null)).unwrap();

    let report = frames.sweep_stale(Duration::from_millis(24 * HOUR_MS)).unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.orphaned.len(), 1);
    assert_eq!(report.orphaned[0].id, old);
    assert_eq!(report.orphaned[0].age_ms, 30 * HOUR_MS);

    assert!(frames.get(&old).unwrap().is_active());
    assert!(frames.get(&recent).unwrap().is_active());
}

#[test]
fn test_list_filters_by_state_in_creation_order() {
    let (engine, clock) = temp_engine();
    let frames = engine.frames();
    let first = frames.start("one", "task", None).unwrap();
    clock.advance(Duration::from_millis(1));
    let second = frames.start("two", "task", None).unwrap();
    clock.advance(Duration::from_millis(1));
    let third = frames.start("three", "task", None).unwrap();
    frames.abort(&second, "nope").unwrap();

    let active: Vec<FrameId> = frames
        .list(Some(FrameState::Active))
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(active, vec![first, third]);
    assert_eq!(frames.list(Some(FrameState::Aborted)).unwrap().len(), 1);
}

#[test]
fn test_expired_deadline_rejects_point_writes() {
    let (engine, _clock) = temp_engine();
    let frame = engine.frames().start("t", "task", None).unwrap();
    let expired = Deadline::after(Duration::ZERO);
    std::thread::sleep(Duration::from_millis(2));

    let capture = engine
        .contexts()
        .add_within(NewContext::new(ContextType::Note, "late", frame.clone()), &expired);
    assert!(matches!(capture, Err(ApiError::DeadlineExceeded { .. })));
    assert!(matches!(
        engine.frames().close_within(&frame, json!(null), &expired),
        Err(ApiError::DeadlineExceeded { .. })
    ));
    assert_eq!(engine.contexts().count(), 0);
    assert!(engine.frames().get(&frame).unwrap().is_active());
}
