//! CLI presentation: text and json formatters per command family.

use crate::checkpoint::{Checkpoint, RehydrationBundle};
use crate::context::ContextItem;
use crate::engine::InputCheck;
use crate::error::{ApiError, StorageError};
use crate::frame::Frame;
use crate::scheduler::{JobOutcome, JobOutput};
use crate::status::format_section_heading;
use crate::types::{format_millis, FrameId};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;
use std::collections::HashMap;

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        ApiError::StorageError(StorageError::Encode {
            table: "output",
            message: e.to_string(),
        })
    })
}

pub fn format_item_text(item: &ContextItem) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} [{}]\n", item.id, item.context_type));
    out.push_str(&format!("  Frame: {}\n", item.frame_id));
    out.push_str(&format!(
        "  Importance: {:.3} (base {:.3})\n",
        item.importance, item.base_importance
    ));
    out.push_str(&format!("  Accesses: {}\n", item.access_count));
    out.push_str(&format!("  Created: {}\n", format_millis(item.created_at)));
    out.push_str(&format!("  Last accessed: {}\n", format_millis(item.last_accessed)));
    if !item.tags.is_empty() {
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        out.push_str(&format!("  Tags: {}\n", tags.join(", ")));
    }
    for (key, value) in &item.external_refs {
        out.push_str(&format!("  Ref {}: {}\n", key, value));
    }
    out.push('\n');
    out.push_str(&item.content);
    out
}

pub fn format_items_text(items: &[ContextItem]) -> String {
    if items.is_empty() {
        return "No matching context items.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Type", "Importance", "Hits", "Content"]);
    for item in items {
        table.add_row(vec![
            item.id.to_string(),
            item.context_type.to_string(),
            format!("{:.2}", item.importance),
            item.access_count.to_string(),
            crate::context::excerpt(&item.content, 60),
        ]);
    }
    table.to_string()
}

pub fn format_frame_text(frame: &Frame) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {} ({})\n", frame.id, frame.name, frame.frame_type));
    out.push_str(&format!("  State: {}\n", frame.state));
    out.push_str(&format!("  Depth: {}\n", frame.depth));
    if let Some(parent) = &frame.parent_frame_id {
        out.push_str(&format!("  Parent: {}\n", parent));
    }
    out.push_str(&format!("  Started: {}\n", format_millis(frame.created_at)));
    if let Some(closed_at) = frame.closed_at {
        out.push_str(&format!("  Ended: {}\n", format_millis(closed_at)));
    }
    if let Some(reason) = &frame.abort_reason {
        out.push_str(&format!("  Abort reason: {}\n", reason));
    }
    if let Some(digest) = &frame.digest_text {
        out.push_str(&format!("\n{}\n", digest));
    }
    out
}

pub fn format_frames_text(frames: &[Frame]) -> String {
    if frames.is_empty() {
        return "No frames.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Name", "Type", "State", "Depth", "Started"]);
    for frame in frames {
        table.add_row(vec![
            frame.id.to_string(),
            frame.name.clone(),
            frame.frame_type.clone(),
            frame.state.to_string(),
            frame.depth.to_string(),
            format_millis(frame.created_at),
        ]);
    }
    table.to_string()
}

/// Indented tree; `frames` ordered by creation time.
pub fn format_frame_tree(frames: &[Frame]) -> String {
    if frames.is_empty() {
        return "No frames.".to_string();
    }
    let mut children: HashMap<Option<&FrameId>, Vec<&Frame>> = HashMap::new();
    for frame in frames {
        children
            .entry(frame.parent_frame_id.as_ref())
            .or_default()
            .push(frame);
    }

    let mut out = String::new();
    let mut stack: Vec<(&Frame, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|f| (*f, 0)).collect())
        .unwrap_or_default();
    while let Some((frame, level)) = stack.pop() {
        out.push_str(&format!(
            "{}{} [{}] {} ({})\n",
            "  ".repeat(level),
            if level == 0 { "*" } else { "-" },
            frame.state,
            frame.name,
            frame.id
        ));
        if let Some(kids) = children.get(&Some(&frame.id)) {
            stack.extend(kids.iter().rev().map(|f| (*f, level + 1)));
        }
    }
    out
}

pub fn format_checkpoints_text(checkpoints: &[Checkpoint]) -> String {
    if checkpoints.is_empty() {
        return "No checkpoints.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Reason", "Created", "Frames", "Items", "Bytes"]);
    for checkpoint in checkpoints {
        table.add_row(vec![
            checkpoint.id.to_string(),
            checkpoint.reason.to_string(),
            format_millis(checkpoint.created_at),
            checkpoint.frames.len().to_string(),
            checkpoint.contexts.len().to_string(),
            checkpoint.bytes_used.to_string(),
        ]);
    }
    table.to_string()
}

pub fn format_bundle(bundle: &RehydrationBundle, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        to_json(bundle)
    } else {
        Ok(bundle.text.clone())
    }
}

pub fn format_input_check(check: &InputCheck, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(check);
    }
    match &check.bundle {
        Some(bundle) => Ok(bundle.text.clone()),
        None if check.outcome.suppressed => {
            Ok("Compaction detected; rehydration suppressed by cooldown.".to_string())
        }
        None => Ok(String::new()),
    }
}

pub fn format_maintenance(outcomes: &[JobOutcome]) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Maintenance"));
    if outcomes.is_empty() {
        out.push_str("No jobs due.\n");
        return out;
    }
    for outcome in outcomes {
        let line = match outcome {
            JobOutcome::Ran { kind, output } => match output {
                JobOutput::Decay(report) => format!(
                    "{}: {} updated of {} scanned",
                    kind, report.updated, report.scanned
                ),
                JobOutput::StaleSweep(report) => {
                    format!("{}: {} orphaned frame(s)", kind, report.orphaned.len())
                }
                JobOutput::Checkpoint(id) => format!("{}: created {}", kind, id),
            },
            JobOutcome::Skipped { kind } => format!("{}: skipped (already running)", kind),
            JobOutcome::Failed { kind, error } => format!("{}: failed: {}", kind, error),
        };
        out.push_str(&format!("  {}\n", line));
    }
    out
}
