//! Checkpoints
//!
//! A checkpoint is an immutable, budget-bounded snapshot of the most relevant
//! frames and context items. Consumption is tracked in a side table so the
//! snapshot itself is never rewritten: a checkpoint is consumed once a newer
//! one supersedes it or a caller acknowledges it with
//! [`RehydrationManager::mark_consumed`].

pub mod manager;
pub mod select;

pub use manager::{RehydrationBundle, RehydrationManager};
pub use select::{select_entries, Selection};

use crate::context::ContextType;
use crate::error::{ApiError, StorageError};
use crate::frame::FrameState;
use crate::store::ProjectStore;
use crate::types::{CheckpointId, ContextId, FrameId, Millis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointReason {
    Manual,
    Periodic,
    PreClear,
}

impl CheckpointReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointReason::Manual => "manual",
            CheckpointReason::Periodic => "periodic",
            CheckpointReason::PreClear => "pre-clear",
        }
    }
}

impl fmt::Display for CheckpointReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointReason {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "manual" => Ok(CheckpointReason::Manual),
            "periodic" => Ok(CheckpointReason::Periodic),
            "pre-clear" | "preclear" => Ok(CheckpointReason::PreClear),
            other => Err(ApiError::validation(format!(
                "unknown checkpoint reason '{}'",
                other
            ))),
        }
    }
}

/// Size limits applied when a checkpoint is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointBudget {
    /// Upper bound on the serialized snapshot, in bytes.
    pub max_bytes: usize,
    /// Upper bound on estimated tokens (`ceil(bytes / 4)`).
    pub max_tokens: usize,
    pub max_frames: usize,
    pub max_items: usize,
}

impl Default for CheckpointBudget {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024,
            max_tokens: 4_000,
            max_frames: 10,
            max_items: 40,
        }
    }
}

impl CheckpointBudget {
    /// The budget must at least hold an empty snapshot.
    pub fn validate(&self) -> Result<(), ApiError> {
        let floor = select::empty_snapshot_bytes();
        if self.max_bytes < floor {
            return Err(ApiError::validation(format!(
                "checkpoint max_bytes must be at least {}, got {}",
                floor, self.max_bytes
            )));
        }
        if self.max_tokens < estimate_tokens(floor) {
            return Err(ApiError::validation(format!(
                "checkpoint max_tokens must be at least {}, got {}",
                estimate_tokens(floor),
                self.max_tokens
            )));
        }
        Ok(())
    }

    pub fn fits(&self, bytes: usize) -> bool {
        bytes <= self.max_bytes && estimate_tokens(bytes) <= self.max_tokens
    }
}

/// Token estimate used for budgets: four bytes per token, rounded up.
pub fn estimate_tokens(bytes: usize) -> usize {
    bytes.div_ceil(4)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub id: FrameId,
    pub parent_frame_id: Option<FrameId>,
    pub depth: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub frame_type: String,
    pub state: FrameState,
    pub created_at: Millis,
    pub closed_at: Option<Millis>,
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextExcerpt {
    pub id: ContextId,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    pub frame_id: FrameId,
    pub score: f64,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    /// Store-wide creation sequence; orders checkpoints minted in the same
    /// millisecond.
    #[serde(default)]
    pub seq: u64,
    pub created_at: Millis,
    pub reason: CheckpointReason,
    pub frames: Vec<FrameSummary>,
    pub contexts: Vec<ContextExcerpt>,
    pub bytes_used: usize,
    pub tokens_used: usize,
    pub budget: CheckpointBudget,
}

impl Checkpoint {
    pub fn context_ids(&self) -> impl Iterator<Item = &ContextId> {
        self.contexts.iter().map(|c| &c.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Consumption {
    Superseded { by: CheckpointId },
    Acknowledged,
}

/// Consumption marker stored beside an immutable checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub checkpoint_id: CheckpointId,
    pub consumed_at: Millis,
    pub consumption: Consumption,
}

/// Ids referenced by checkpoints that have not been consumed yet.
///
/// Callers that delete context items must hold the writer section while
/// calling this so no checkpoint lands between the read and the delete.
pub fn protected_context_ids(store: &ProjectStore) -> Result<HashSet<ContextId>, StorageError> {
    let mut protected = HashSet::new();
    for checkpoint in store.checkpoints().iter() {
        let checkpoint = checkpoint?;
        if store.checkpoint_state().contains(checkpoint.id.as_ref())? {
            continue;
        }
        protected.extend(checkpoint.context_ids().cloned());
    }
    Ok(protected)
}
