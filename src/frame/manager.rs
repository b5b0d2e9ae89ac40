//! Frame Manager: lifecycle transitions, tree navigation, and the stale-frame
//! report.

use crate::clock::SharedClock;
use crate::concurrency::Deadline;
use crate::context::{ContextFilter, ContextStore};
use crate::error::ApiError;
use crate::frame::{Frame, FrameDigest, FrameState};
use crate::store::ProjectStore;
use crate::types::{FrameId, Millis};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Frames still ACTIVE past the staleness threshold.
///
/// Read-only: listed frames are never closed or aborted by the sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrphanReport {
    pub threshold_ms: u64,
    pub checked: usize,
    pub orphaned: Vec<OrphanedFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanedFrame {
    pub id: FrameId,
    pub name: String,
    pub frame_type: String,
    pub created_at: Millis,
    pub age_ms: u64,
}

#[derive(Clone)]
pub struct FrameManager {
    store: Arc<ProjectStore>,
    clock: SharedClock,
    contexts: ContextStore,
    digest_top_k: usize,
}

impl FrameManager {
    pub fn new(
        store: Arc<ProjectStore>,
        clock: SharedClock,
        contexts: ContextStore,
        digest_top_k: usize,
    ) -> Self {
        Self {
            store,
            clock,
            contexts,
            digest_top_k,
        }
    }

    /// Start an ACTIVE frame, optionally under `parent`.
    pub fn start(
        &self,
        name: &str,
        frame_type: &str,
        parent: Option<&FrameId>,
    ) -> Result<FrameId, ApiError> {
        self.start_with_inputs(name, frame_type, parent, Value::Null)
    }

    pub fn start_with_inputs(
        &self,
        name: &str,
        frame_type: &str,
        parent: Option<&FrameId>,
        inputs: Value,
    ) -> Result<FrameId, ApiError> {
        self.start_within(name, frame_type, parent, inputs, &Deadline::none())
    }

    pub fn start_within(
        &self,
        name: &str,
        frame_type: &str,
        parent: Option<&FrameId>,
        inputs: Value,
        deadline: &Deadline,
    ) -> Result<FrameId, ApiError> {
        let name = name.trim();
        let frame_type = frame_type.trim();
        if name.is_empty() {
            return Err(ApiError::validation("frame name must not be empty"));
        }
        if frame_type.is_empty() {
            return Err(ApiError::validation("frame type must not be empty"));
        }

        self.store.write_within(deadline, "start_frame", || {
            let depth = match parent {
                Some(parent_id) => self.get(parent_id)?.depth + 1,
                None => 0,
            };
            let now = self.clock.now_ms();
            let parent_bytes: &[u8] = parent.map(|p| p.as_ref()).unwrap_or_default();
            let id = FrameId::generate(now, &[name.as_bytes(), frame_type.as_bytes(), parent_bytes]);
            let frame = Frame {
                id: id.clone(),
                parent_frame_id: parent.cloned(),
                depth,
                frame_type: frame_type.to_string(),
                name: name.to_string(),
                state: FrameState::Active,
                inputs,
                outputs: None,
                digest_text: None,
                digest_json: None,
                created_at: now,
                closed_at: None,
                abort_reason: None,
            };
            self.store.frames().insert(id.as_ref(), &frame)?;
            info!(frame_id = %id, name, frame_type, depth, "frame started");
            Ok(id)
        })
    }

    /// Close an ACTIVE frame, recording outputs and its digest.
    pub fn close(&self, frame_id: &FrameId, outputs: Value) -> Result<Frame, ApiError> {
        self.close_within(frame_id, outputs, &Deadline::none())
    }

    pub fn close_within(
        &self,
        frame_id: &FrameId,
        outputs: Value,
        deadline: &Deadline,
    ) -> Result<Frame, ApiError> {
        self.store.write_within(deadline, "close_frame", || {
            let mut frame = self.get(frame_id)?;
            if frame.state != FrameState::Active {
                return Err(ApiError::validation(format!(
                    "cannot close frame {} in state {}",
                    frame_id, frame.state
                )));
            }

            let ranked = self
                .contexts
                .ranked(&ContextFilter::in_frame(frame_id.clone()), deadline)?;
            let digest = FrameDigest::compute(&frame, &ranked, self.digest_top_k, &outputs);
            frame.state = FrameState::Closed;
            frame.closed_at = Some(self.clock.now_ms());
            frame.outputs = Some(outputs);
            frame.digest_text = Some(digest.text);
            frame.digest_json = Some(digest.json);
            self.store.frames().insert(frame_id.as_ref(), &frame)?;
            info!(frame_id = %frame_id, items = ranked.len(), "frame closed");
            Ok(frame)
        })
    }

    /// Abort a frame. Aborting an ABORTED frame is a no-op.
    pub fn abort(&self, frame_id: &FrameId, reason: &str) -> Result<Frame, ApiError> {
        self.abort_within(frame_id, reason, &Deadline::none())
    }

    pub fn abort_within(
        &self,
        frame_id: &FrameId,
        reason: &str,
        deadline: &Deadline,
    ) -> Result<Frame, ApiError> {
        self.store.write_within(deadline, "abort_frame", || {
            let mut frame = self.get(frame_id)?;
            match frame.state {
                FrameState::Aborted => return Ok(frame),
                FrameState::Closed => {
                    return Err(ApiError::validation(format!(
                        "cannot abort closed frame {}",
                        frame_id
                    )));
                }
                FrameState::Active => {}
            }
            frame.state = FrameState::Aborted;
            frame.closed_at = Some(self.clock.now_ms());
            frame.abort_reason = Some(reason.to_string());
            self.store.frames().insert(frame_id.as_ref(), &frame)?;
            warn!(frame_id = %frame_id, reason, "frame aborted");
            Ok(frame)
        })
    }

    pub fn get(&self, frame_id: &FrameId) -> Result<Frame, ApiError> {
        self.store
            .frames()
            .get(frame_id.as_ref())?
            .ok_or_else(|| ApiError::not_found("frame", frame_id.as_str()))
    }

    /// Frames ordered by creation time, optionally filtered by state.
    pub fn list(&self, state: Option<FrameState>) -> Result<Vec<Frame>, ApiError> {
        let mut frames: Vec<Frame> = self
            .store
            .frames()
            .values()?
            .into_iter()
            .filter(|f| state.map_or(true, |s| f.state == s))
            .collect();
        frames.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(frames)
    }

    /// Direct children, ordered by creation time.
    pub fn children(&self, frame_id: &FrameId) -> Result<Vec<Frame>, ApiError> {
        self.get(frame_id)?;
        Ok(self
            .list(None)?
            .into_iter()
            .filter(|f| f.parent_frame_id.as_ref() == Some(frame_id))
            .collect())
    }

    /// Path from the root down to `frame_id`, inclusive.
    pub fn ancestors(&self, frame_id: &FrameId) -> Result<Vec<Frame>, ApiError> {
        let mut path = vec![self.get(frame_id)?];
        let mut seen: HashSet<FrameId> = HashSet::from([frame_id.clone()]);
        while let Some(parent_id) = path.last().and_then(|f| f.parent_frame_id.clone()) {
            if !seen.insert(parent_id.clone()) {
                return Err(ApiError::validation(format!(
                    "frame tree cycle detected at {}",
                    parent_id
                )));
            }
            path.push(self.get(&parent_id)?);
        }
        path.reverse();
        Ok(path)
    }

    /// Report ACTIVE frames older than `threshold`.
    pub fn sweep_stale(&self, threshold: Duration) -> Result<OrphanReport, ApiError> {
        let now = self.clock.now_ms();
        let threshold_ms = threshold.as_millis() as u64;
        let active = self.list(Some(FrameState::Active))?;
        let orphaned: Vec<OrphanedFrame> = active
            .iter()
            .filter_map(|frame| {
                let age_ms = now.saturating_sub(frame.created_at);
                (age_ms > threshold_ms).then(|| OrphanedFrame {
                    id: frame.id.clone(),
                    name: frame.name.clone(),
                    frame_type: frame.frame_type.clone(),
                    created_at: frame.created_at,
                    age_ms,
                })
            })
            .collect();
        if !orphaned.is_empty() {
            warn!(count = orphaned.len(), threshold_ms, "orphaned frames detected");
        }
        Ok(OrphanReport {
            threshold_ms,
            checked: active.len(),
            orphaned,
        })
    }

    pub fn count(&self) -> usize {
        self.store.frames().len()
    }
}
