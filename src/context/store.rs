//! Context Store: capture, lookup, ranked query, and access bookkeeping.

use crate::attention::decay::DecayModel;
use crate::clock::SharedClock;
use crate::concurrency::Deadline;
use crate::context::{ContextFilter, ContextItem, ContextType, NewContext};
use crate::error::ApiError;
use crate::store::ProjectStore;
use crate::types::{ContextId, FrameId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Context item paired with its current decayed score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredContext {
    pub item: ContextItem,
    pub score: f64,
}

/// Owns the `contexts` table.
#[derive(Clone)]
pub struct ContextStore {
    pub(crate) store: Arc<ProjectStore>,
    pub(crate) clock: SharedClock,
    decay: DecayModel,
}

impl ContextStore {
    pub fn new(store: Arc<ProjectStore>, clock: SharedClock, decay: DecayModel) -> Self {
        Self {
            store,
            clock,
            decay,
        }
    }

    pub fn decay_model(&self) -> &DecayModel {
        &self.decay
    }

    /// Capture a context item under `frame_id`.
    pub fn add_context(
        &self,
        context_type: ContextType,
        content: &str,
        frame_id: &FrameId,
        importance: Option<f64>,
    ) -> Result<ContextId, ApiError> {
        let mut request = NewContext::new(context_type, content, frame_id.clone());
        request.importance = importance;
        self.add(request)
    }

    /// Capture a context item with tags and external references.
    pub fn add(&self, request: NewContext) -> Result<ContextId, ApiError> {
        self.add_within(request, &Deadline::none())
    }

    pub fn add_within(&self, request: NewContext, deadline: &Deadline) -> Result<ContextId, ApiError> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(ApiError::validation("context content must not be empty"));
        }
        let importance = match request.importance {
            Some(value) if !value.is_finite() || !(0.0..=1.0).contains(&value) => {
                return Err(ApiError::validation(format!(
                    "importance must be within [0, 1], got {}",
                    value
                )));
            }
            Some(value) => value,
            None => request.context_type.default_importance(),
        };

        self.store.write_within(deadline, "add_context", || {
            if !self.store.frames().contains(request.frame_id.as_ref())? {
                return Err(ApiError::validation(format!(
                    "unknown frame id '{}'",
                    request.frame_id
                )));
            }

            let now = self.clock.now_ms();
            let id = ContextId::generate(
                now,
                &[
                    request.context_type.as_str().as_bytes(),
                    content.as_bytes(),
                    request.frame_id.as_ref(),
                ],
            );
            let item = ContextItem {
                id: id.clone(),
                context_type: request.context_type,
                content: content.to_string(),
                importance,
                base_importance: importance,
                access_count: 0,
                created_at: now,
                last_accessed: now,
                frame_id: request.frame_id.clone(),
                tags: request.tags.clone(),
                external_refs: request.external_refs.clone(),
            };
            self.store.contexts().insert(id.as_ref(), &item)?;
            debug!(
                context_id = %id,
                frame_id = %request.frame_id,
                context_type = %request.context_type,
                importance,
                "captured context item"
            );
            Ok(id)
        })
    }

    /// Fetch one item without touching its access bookkeeping.
    pub fn get_context(&self, id: &ContextId) -> Result<ContextItem, ApiError> {
        self.store
            .contexts()
            .get(id.as_ref())?
            .ok_or_else(|| ApiError::not_found("context", id.as_str()))
    }

    /// Ranked query with the access side effect.
    ///
    /// The result is a point-in-time snapshot: items are selected and ranked
    /// first, then every returned item gets its access count incremented and
    /// its last-accessed time refreshed in one atomic write. The returned
    /// values reflect that bump.
    pub fn query_contexts(
        &self,
        filter: &ContextFilter,
        deadline: &Deadline,
    ) -> Result<Vec<ContextItem>, ApiError> {
        let ranked = self.ranked(filter, deadline)?;
        let ids: Vec<ContextId> = ranked.iter().map(|s| s.item.id.clone()).collect();
        let mut touched: HashMap<ContextId, ContextItem> = self
            .touch(&ids, deadline)?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        // Items pruned between ranking and touching drop out of the result.
        Ok(ids.iter().filter_map(|id| touched.remove(id)).collect())
    }

    /// Ranked selection without side effects.
    pub fn ranked(
        &self,
        filter: &ContextFilter,
        deadline: &Deadline,
    ) -> Result<Vec<ScoredContext>, ApiError> {
        let now = self.clock.now_ms();
        let terms = filter.terms();
        let mut matches = Vec::new();

        for (scanned, item) in self.store.contexts().iter().enumerate() {
            if scanned % 256 == 0 {
                deadline.check("query_contexts")?;
            }
            let item = item?;
            if !filter.matches(&item, &terms) {
                continue;
            }
            let score = self.decay.score_item(&item, now);
            if let Some(min) = filter.min_importance {
                if score < min {
                    continue;
                }
            }
            matches.push(ScoredContext { item, score });
        }

        matches.sort_by(rank_order);
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    /// Apply the access side effect to `ids`; returns the updated items.
    ///
    /// Ids that no longer exist are skipped.
    pub fn touch(&self, ids: &[ContextId], deadline: &Deadline) -> Result<Vec<ContextItem>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.write_within(deadline, "touch", || {
            let now = self.clock.now_ms();
            let mut updated = Vec::with_capacity(ids.len());
            let mut writes = Vec::with_capacity(ids.len());
            for id in ids {
                let Some(mut item) = self.store.contexts().get(id.as_ref())? else {
                    continue;
                };
                item.access_count = item.access_count.saturating_add(1);
                item.last_accessed = now.max(item.last_accessed);
                writes.push((id.as_ref().to_vec(), Some(item.clone())));
                updated.push(item);
            }
            self.store.contexts().apply(writes)?;
            Ok(updated)
        })
    }

    /// Attach or replace an opaque external reference.
    pub fn set_external_ref(
        &self,
        id: &ContextId,
        key: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        if key.trim().is_empty() {
            return Err(ApiError::validation("external reference key must not be empty"));
        }
        self.update(id, |item| {
            item.external_refs.insert(key.to_string(), value.to_string());
        })
    }

    pub fn add_tags(&self, id: &ContextId, tags: &[String]) -> Result<(), ApiError> {
        self.update(id, |item| {
            item.tags
                .extend(tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).map(str::to_string));
        })
    }

    pub fn count(&self) -> usize {
        self.store.contexts().len()
    }

    fn update(&self, id: &ContextId, f: impl FnOnce(&mut ContextItem)) -> Result<(), ApiError> {
        self.store.write(|| {
            let mut item = self
                .store
                .contexts()
                .get(id.as_ref())?
                .ok_or_else(|| ApiError::not_found("context", id.as_str()))?;
            f(&mut item);
            self.store.contexts().insert(id.as_ref(), &item)?;
            info!(context_id = %id, "updated context metadata");
            Ok(())
        })
    }
}

/// Score descending, then access count descending, then id ascending.
pub(crate) fn rank_order(a: &ScoredContext, b: &ScoredContext) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.item.access_count.cmp(&a.item.access_count))
        .then_with(|| a.item.id.cmp(&b.item.id))
}
