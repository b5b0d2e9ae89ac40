//! Attention Tracker
//!
//! Every retrieval query is logged with the ids it matched. The log feeds the
//! status reader's query-pattern report and is never rewritten.

pub mod decay;

pub use decay::{DecayEngine, DecayModel, SweepReport};

use crate::clock::SharedClock;
use crate::concurrency::Deadline;
use crate::context::{ContextFilter, ContextStore};
use crate::error::ApiError;
use crate::types::{AttentionId, ContextId, Millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// One logged retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionLogEntry {
    pub id: AttentionId,
    pub query: String,
    pub timestamp: Millis,
    pub matched_ids: Vec<ContextId>,
    pub result_count: usize,
}

/// Normalized query text with its frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPattern {
    pub pattern: String,
    pub count: usize,
    pub last_seen: Millis,
}

#[derive(Clone)]
pub struct AttentionTracker {
    contexts: ContextStore,
    clock: SharedClock,
}

impl AttentionTracker {
    pub fn new(contexts: ContextStore, clock: SharedClock) -> Self {
        Self { contexts, clock }
    }

    /// Run a text query and log it, even when nothing matches.
    ///
    /// Blank text matches nothing.
    pub fn record_query(
        &self,
        text: &str,
        deadline: &Deadline,
    ) -> Result<Vec<ContextId>, ApiError> {
        let matched: Vec<ContextId> = if text.trim().is_empty() {
            Vec::new()
        } else {
            self.contexts
                .query_contexts(&ContextFilter::new().text(text), deadline)?
                .into_iter()
                .map(|item| item.id)
                .collect()
        };

        let store = &self.contexts.store;
        store.write_within(deadline, "record_query", || {
            let now = self.clock.now_ms();
            let id = AttentionId::generate(now, &[text.as_bytes()]);
            let entry = AttentionLogEntry {
                id: id.clone(),
                query: text.to_string(),
                timestamp: now,
                matched_ids: matched.clone(),
                result_count: matched.len(),
            };
            store.attention().insert(id.as_ref(), &entry)?;
            debug!(attention_id = %id, result_count = entry.result_count, "logged query");
            Ok(())
        })?;
        Ok(matched)
    }

    /// Entries within `window` of now, oldest first.
    pub fn recent(&self, window: Duration) -> Result<Vec<AttentionLogEntry>, ApiError> {
        let since = self
            .clock
            .now_ms()
            .saturating_sub(window.as_millis() as u64);
        let mut entries = Vec::new();
        for entry in self.contexts.store.attention().iter() {
            let entry = entry?;
            if entry.timestamp >= since {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Most frequent normalized queries within `window`.
    pub fn pattern_frequency(
        &self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<QueryPattern>, ApiError> {
        let mut counts: HashMap<String, QueryPattern> = HashMap::new();
        for entry in self.recent(window)? {
            let pattern = normalize_query(&entry.query);
            if pattern.is_empty() {
                continue;
            }
            let slot = counts.entry(pattern.clone()).or_insert(QueryPattern {
                pattern,
                count: 0,
                last_seen: entry.timestamp,
            });
            slot.count += 1;
            slot.last_seen = slot.last_seen.max(entry.timestamp);
        }
        let mut patterns: Vec<QueryPattern> = counts.into_values().collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pattern.cmp(&b.pattern)));
        patterns.truncate(limit);
        Ok(patterns)
    }

    pub fn count(&self) -> usize {
        self.contexts.store.attention().len()
    }
}

/// NFKC, lowercase, whitespace collapsed.
pub fn normalize_query(text: &str) -> String {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
