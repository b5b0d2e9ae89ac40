//! Context Items
//!
//! Atomic facts (observations, decisions, errors, …) captured during a
//! session. Each item belongs to exactly one frame and carries an importance
//! score that the decay engine recomputes over time.

pub mod retention;
pub mod store;

pub use retention::{BackupPolicy, PrunePolicy, PruneReport};
pub use store::{ContextStore, ScoredContext};

use crate::error::ApiError;
use crate::types::{ContextId, FrameId, Millis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind of captured fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Observation,
    Decision,
    Error,
    Task,
    Insight,
    Reference,
    Note,
}

impl ContextType {
    pub const ALL: [ContextType; 7] = [
        ContextType::Observation,
        ContextType::Decision,
        ContextType::Error,
        ContextType::Task,
        ContextType::Insight,
        ContextType::Reference,
        ContextType::Note,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContextType::Observation => "observation",
            ContextType::Decision => "decision",
            ContextType::Error => "error",
            ContextType::Task => "task",
            ContextType::Insight => "insight",
            ContextType::Reference => "reference",
            ContextType::Note => "note",
        }
    }

    /// Importance assigned at capture when the caller gives none.
    pub fn default_importance(self) -> f64 {
        match self {
            ContextType::Decision => 0.8,
            ContextType::Error => 0.75,
            ContextType::Insight => 0.65,
            ContextType::Task => 0.6,
            ContextType::Observation => 0.5,
            ContextType::Reference => 0.45,
            ContextType::Note => 0.4,
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ContextType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ApiError::validation(format!("unknown context type '{}'", s)))
    }
}

/// Stored context item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: ContextId,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    pub content: String,
    /// Last recomputed decayed importance, in [0, 1].
    pub importance: f64,
    /// Importance at capture time, in [0, 1]. Never changes.
    pub base_importance: f64,
    pub access_count: u64,
    pub created_at: Millis,
    pub last_accessed: Millis,
    pub frame_id: FrameId,
    pub tags: BTreeSet<String>,
    /// Opaque references owned by integrations (issue keys, URLs, …).
    pub external_refs: BTreeMap<String, String>,
}

/// Capture request for a new context item
#[derive(Debug, Clone)]
pub struct NewContext {
    pub context_type: ContextType,
    pub content: String,
    pub frame_id: FrameId,
    pub importance: Option<f64>,
    pub tags: BTreeSet<String>,
    pub external_refs: BTreeMap<String, String>,
}

impl NewContext {
    pub fn new(context_type: ContextType, content: impl Into<String>, frame_id: FrameId) -> Self {
        Self {
            context_type,
            content: content.into(),
            frame_id,
            importance: None,
            tags: BTreeSet::new(),
            external_refs: BTreeMap::new(),
        }
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn external_ref(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_refs.insert(key.into(), value.into());
        self
    }
}

/// Query filter; every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFilter {
    #[serde(rename = "type")]
    pub context_type: Option<ContextType>,
    /// Item must carry all of these tags.
    pub tags: Vec<String>,
    pub frame_id: Option<FrameId>,
    /// Lower bound on the current decayed score.
    pub min_importance: Option<f64>,
    /// Case-insensitive terms that must all occur in the content.
    pub text: Option<String>,
    pub limit: Option<usize>,
}

impl ContextFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_frame(frame_id: FrameId) -> Self {
        Self {
            frame_id: Some(frame_id),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, context_type: ContextType) -> Self {
        self.context_type = Some(context_type);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Structural match, excluding the score bound which needs the clock.
    pub(crate) fn matches(&self, item: &ContextItem, terms: &[String]) -> bool {
        if let Some(context_type) = self.context_type {
            if item.context_type != context_type {
                return false;
            }
        }
        if let Some(frame_id) = &self.frame_id {
            if &item.frame_id != frame_id {
                return false;
            }
        }
        if !self.tags.iter().all(|tag| item.tags.contains(tag)) {
            return false;
        }
        if !terms.is_empty() {
            let content = item.content.to_lowercase();
            if !terms.iter().all(|term| content.contains(term.as_str())) {
                return false;
            }
        }
        true
    }

    pub(crate) fn terms(&self) -> Vec<String> {
        self.text
            .as_deref()
            .map(|text| text.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default()
    }
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = trimmed.chars().take(keep).collect();
    out.push('…');
    out
}
