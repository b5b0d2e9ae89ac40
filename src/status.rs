//! Memory status data and text rendering.
//!
//! Read-only aggregate report for `stackmemory status`: item counts by type,
//! top items by current score, stale item count, query patterns over the last
//! day, frames by state, orphaned frames, and the latest checkpoint.

use crate::attention::QueryPattern;
use crate::concurrency::Deadline;
use crate::context::{excerpt, ContextFilter, ContextType};
use crate::engine::MemoryEngine;
use crate::error::ApiError;
use crate::frame::{FrameState, OrphanReport};
use crate::types::{format_millis, CheckpointId, ContextId, Millis};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

const PATTERN_WINDOW: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, Copy)]
pub struct StatusOptions {
    pub top_n: usize,
    /// Items not accessed for this long count as stale.
    pub stale_after: Duration,
    pub pattern_limit: usize,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            top_n: 5,
            stale_after: Duration::from_secs(30 * 24 * 3600),
            pattern_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStatus {
    pub project_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    pub total_items: usize,
    pub items_by_type: BTreeMap<String, usize>,
    pub top_items: Vec<TopItem>,
    pub stale_items: usize,
    pub stale_after_days: u64,
    pub query_patterns: Vec<QueryPattern>,
    pub frames_by_state: BTreeMap<String, usize>,
    pub orphaned: OrphanReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_checkpoint: Option<CheckpointStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopItem {
    pub id: ContextId,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    pub score: f64,
    pub access_count: u64,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointStatus {
    pub id: CheckpointId,
    pub reason: String,
    pub created_at: Millis,
    pub contexts: usize,
    pub frames: usize,
    pub bytes_used: usize,
    pub consumed: bool,
}

/// Gather the status report. Never writes.
pub fn build_status(engine: &MemoryEngine, options: &StatusOptions) -> Result<MemoryStatus, ApiError> {
    let now = engine.clock().now_ms();
    let ranked = engine.contexts().ranked(&ContextFilter::new(), &Deadline::none())?;

    let mut items_by_type: BTreeMap<String, usize> = ContextType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();
    let stale_cutoff = now.saturating_sub(options.stale_after.as_millis() as u64);
    let mut stale_items = 0;
    for scored in &ranked {
        *items_by_type
            .entry(scored.item.context_type.as_str().to_string())
            .or_default() += 1;
        if scored.item.last_accessed < stale_cutoff {
            stale_items += 1;
        }
    }

    let top_items = ranked
        .iter()
        .take(options.top_n)
        .map(|scored| TopItem {
            id: scored.item.id.clone(),
            context_type: scored.item.context_type,
            score: scored.score,
            access_count: scored.item.access_count,
            excerpt: excerpt(&scored.item.content, 60),
        })
        .collect();

    let mut frames_by_state: BTreeMap<String, usize> = [FrameState::Active, FrameState::Closed, FrameState::Aborted]
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for frame in engine.frames().list(None)? {
        *frames_by_state.entry(frame.state.as_str().to_string()).or_default() += 1;
    }

    let rehydration = engine.rehydration();
    let latest_checkpoint = match rehydration.latest_checkpoint()? {
        Some(checkpoint) => Some(CheckpointStatus {
            consumed: rehydration.consumption(&checkpoint.id)?.is_some(),
            reason: checkpoint.reason.to_string(),
            created_at: checkpoint.created_at,
            contexts: checkpoint.contexts.len(),
            frames: checkpoint.frames.len(),
            bytes_used: checkpoint.bytes_used,
            id: checkpoint.id,
        }),
        None => None,
    };

    Ok(MemoryStatus {
        project_root: engine.project_root().display().to_string(),
        store_path: engine.store_path().map(|p| p.display().to_string()),
        total_items: ranked.len(),
        items_by_type,
        top_items,
        stale_items,
        stale_after_days: options.stale_after.as_secs() / (24 * 3600),
        query_patterns: engine
            .attention()
            .pattern_frequency(PATTERN_WINDOW, options.pattern_limit)?,
        frames_by_state,
        orphaned: engine.frames().sweep_stale(engine.config().frames.stale_after())?,
        latest_checkpoint,
    })
}

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(header);
    table
}

/// Human-readable status using comfy-table and styled headings.
pub fn format_status_text(data: &MemoryStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Memory Status")));
    out.push_str(&format!("  Project: {}\n", data.project_root));
    if let Some(store) = &data.store_path {
        out.push_str(&format!("  Store: {}\n", store));
    }
    out.push_str(&format!("  Items: {}\n", data.total_items));
    out.push_str(&format!(
        "  Stale (> {} days): {}\n\n",
        data.stale_after_days, data.stale_items
    ));

    out.push_str(&format!("{}\n\n", format_section_heading("Items by type")));
    let mut by_type = table(vec!["Type", "Count"]);
    for (context_type, count) in &data.items_by_type {
        by_type.add_row(vec![context_type.clone(), count.to_string()]);
    }
    out.push_str(&format!("{}\n\n", by_type));

    out.push_str(&format!("{}\n\n", format_section_heading("Top items")));
    if data.top_items.is_empty() {
        out.push_str("No context captured yet.\n\n");
    } else {
        let mut top = table(vec!["Score", "Type", "Hits", "Excerpt"]);
        for item in &data.top_items {
            top.add_row(vec![
                format!("{:.2}", item.score),
                item.context_type.to_string(),
                item.access_count.to_string(),
                item.excerpt.clone(),
            ]);
        }
        out.push_str(&format!("{}\n\n", top));
    }

    out.push_str(&format!("{}\n\n", format_section_heading("Frames")));
    let mut frames = table(vec!["State", "Count"]);
    for (state, count) in &data.frames_by_state {
        frames.add_row(vec![state.clone(), count.to_string()]);
    }
    out.push_str(&format!("{}\n", frames));
    if data.orphaned.orphaned.is_empty() {
        out.push('\n');
    } else {
        out.push_str(&format!(
            "  {} {} frame(s) active past the staleness threshold\n",
            "Orphaned:".yellow(),
            data.orphaned.orphaned.len()
        ));
        for frame in &data.orphaned.orphaned {
            out.push_str(&format!(
                "    {} {} ({}), started {}\n",
                frame.id,
                frame.name,
                frame.frame_type,
                format_millis(frame.created_at)
            ));
        }
        out.push('\n');
    }

    if !data.query_patterns.is_empty() {
        out.push_str(&format!("{}\n\n", format_section_heading("Queries (24h)")));
        let mut patterns = table(vec!["Query", "Count"]);
        for pattern in &data.query_patterns {
            patterns.add_row(vec![pattern.pattern.clone(), pattern.count.to_string()]);
        }
        out.push_str(&format!("{}\n\n", patterns));
    }

    out.push_str(&format!("{}\n", format_section_heading("Latest checkpoint")));
    match &data.latest_checkpoint {
        Some(checkpoint) => {
            let consumed = if checkpoint.consumed {
                "consumed".dimmed().to_string()
            } else {
                "pending".green().to_string()
            };
            out.push_str(&format!(
                "  {} ({}, {}) {} frames, {} items, {} bytes, {}\n",
                checkpoint.id,
                checkpoint.reason,
                format_millis(checkpoint.created_at),
                checkpoint.frames,
                checkpoint.contexts,
                checkpoint.bytes_used,
                consumed
            ));
        }
        None => out.push_str("  none\n"),
    }
    out
}
