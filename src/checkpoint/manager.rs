//! Rehydration Checkpoint Manager
//!
//! Builds checkpoints from the current frame tree and ranked context, and
//! replays them as a bounded text bundle for a fresh session. Creation and
//! rehydration of one project are serialized through a [`ProjectLock`].

use crate::checkpoint::{
    select_entries, Checkpoint, CheckpointBudget, CheckpointReason, CheckpointState, Consumption,
    ContextExcerpt, FrameSummary,
};
use crate::clock::SharedClock;
use crate::concurrency::{Deadline, ProjectLock};
use crate::context::{excerpt, ContextFilter, ContextStore};
use crate::error::ApiError;
use crate::frame::{Frame, FrameState};
use crate::store::ProjectStore;
use crate::types::{format_millis, CheckpointId, ContextId, Millis};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Selection knobs that are not size limits.
#[derive(Debug, Clone, Copy)]
pub struct SelectionPolicy {
    /// Closed frames younger than this are still candidates.
    pub recent_window: Duration,
    pub excerpt_chars: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            recent_window: Duration::from_secs(24 * 3600),
            excerpt_chars: 280,
        }
    }
}

/// Checkpoint content formatted for injection into a new session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RehydrationBundle {
    pub checkpoint_id: CheckpointId,
    pub reason: CheckpointReason,
    pub created_at: Millis,
    pub frames: Vec<FrameSummary>,
    pub contexts: Vec<ContextExcerpt>,
    pub text: String,
}

impl RehydrationBundle {
    pub fn context_ids(&self) -> Vec<ContextId> {
        self.contexts.iter().map(|c| c.id.clone()).collect()
    }
}

#[derive(Clone)]
pub struct RehydrationManager {
    store: Arc<ProjectStore>,
    clock: SharedClock,
    contexts: ContextStore,
    lock: Arc<ProjectLock>,
    budget: CheckpointBudget,
    policy: SelectionPolicy,
}

impl RehydrationManager {
    pub fn new(
        store: Arc<ProjectStore>,
        clock: SharedClock,
        contexts: ContextStore,
        lock: Arc<ProjectLock>,
        budget: CheckpointBudget,
        policy: SelectionPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            contexts,
            lock,
            budget,
            policy,
        }
    }

    pub fn default_budget(&self) -> CheckpointBudget {
        self.budget
    }

    /// Snapshot the most relevant frames and items within `budget`.
    pub fn create_checkpoint(
        &self,
        reason: CheckpointReason,
        budget: Option<CheckpointBudget>,
        deadline: &Deadline,
    ) -> Result<CheckpointId, ApiError> {
        let budget = budget.unwrap_or(self.budget);
        budget.validate()?;
        let _guard = self.lock.acquire(deadline)?;
        self.create_locked(reason, budget, deadline)
            .map(|checkpoint| checkpoint.id)
    }

    /// Checkpoints, newest first.
    pub fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, ApiError> {
        let mut checkpoints = self.store.checkpoints().values()?;
        checkpoints.sort_by(|a, b| {
            b.seq
                .cmp(&a.seq)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(checkpoints)
    }

    pub fn get_checkpoint(&self, id: &CheckpointId) -> Result<Checkpoint, ApiError> {
        self.store
            .checkpoints()
            .get(id.as_ref())?
            .ok_or_else(|| ApiError::not_found("checkpoint", id.as_str()))
    }

    pub fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, ApiError> {
        Ok(self.list_checkpoints()?.into_iter().next())
    }

    pub fn consumption(&self, id: &CheckpointId) -> Result<Option<CheckpointState>, ApiError> {
        Ok(self.store.checkpoint_state().get(id.as_ref())?)
    }

    /// Render a checkpoint for a fresh session.
    ///
    /// Without an id the newest checkpoint is used, created on the spot when
    /// none exists. Included items still present get their access bumped;
    /// nothing else is written.
    pub fn rehydrate(
        &self,
        checkpoint_id: Option<&CheckpointId>,
        deadline: &Deadline,
    ) -> Result<RehydrationBundle, ApiError> {
        let _guard = self.lock.acquire(deadline)?;
        let checkpoint = match checkpoint_id {
            Some(id) => self.get_checkpoint(id)?,
            None => match self.latest_checkpoint()? {
                Some(checkpoint) => checkpoint,
                None => self.create_locked(CheckpointReason::Manual, self.budget, deadline)?,
            },
        };

        let ids: Vec<ContextId> = checkpoint.context_ids().cloned().collect();
        self.contexts.touch(&ids, deadline)?;
        info!(
            checkpoint_id = %checkpoint.id,
            frames = checkpoint.frames.len(),
            contexts = checkpoint.contexts.len(),
            "rehydrated checkpoint"
        );
        Ok(bundle(checkpoint))
    }

    /// Acknowledge a checkpoint so its items no longer block retention.
    pub fn mark_consumed(&self, id: &CheckpointId) -> Result<(), ApiError> {
        self.mark_consumed_within(id, &Deadline::none())
    }

    pub fn mark_consumed_within(&self, id: &CheckpointId, deadline: &Deadline) -> Result<(), ApiError> {
        self.store.write_within(deadline, "mark_consumed", || {
            if !self.store.checkpoints().contains(id.as_ref())? {
                return Err(ApiError::not_found("checkpoint", id.as_str()));
            }
            if self.store.checkpoint_state().contains(id.as_ref())? {
                return Ok(());
            }
            let state = CheckpointState {
                checkpoint_id: id.clone(),
                consumed_at: self.clock.now_ms(),
                consumption: Consumption::Acknowledged,
            };
            self.store.checkpoint_state().insert(id.as_ref(), &state)?;
            info!(checkpoint_id = %id, "checkpoint marked consumed");
            Ok(())
        })
    }

    /// Caller holds the project lock.
    fn create_locked(
        &self,
        reason: CheckpointReason,
        budget: CheckpointBudget,
        deadline: &Deadline,
    ) -> Result<Checkpoint, ApiError> {
        let now = self.clock.now_ms();
        let frames = self.frame_candidates(now)?;
        let contexts: Vec<ContextExcerpt> = self
            .contexts
            .ranked(&ContextFilter::new().limit(budget.max_items), deadline)?
            .into_iter()
            .map(|scored| ContextExcerpt {
                id: scored.item.id,
                context_type: scored.item.context_type,
                frame_id: scored.item.frame_id,
                score: scored.score,
                excerpt: excerpt(&scored.item.content, self.policy.excerpt_chars),
            })
            .collect();

        let selection = select_entries(&frames, &contexts, &budget);
        debug!(
            frames = selection.frames.len(),
            contexts = selection.contexts.len(),
            bytes = selection.bytes_used,
            truncated = selection.truncated,
            "checkpoint selection complete"
        );

        self.store.write(|| {
            // Items pruned since selection are left out.
            let mut contexts = selection.contexts;
            let mut kept = Vec::with_capacity(contexts.len());
            for entry in contexts.drain(..) {
                if self.store.contexts().contains(entry.id.as_ref())? {
                    kept.push(entry);
                }
            }
            let bytes_used = super::select::snapshot_bytes(&selection.frames, &kept);

            let seq = self.store.next_sequence()?;
            let id = CheckpointId::generate(now, &[reason.as_str().as_bytes(), &seq.to_le_bytes()[..]]);
            let checkpoint = Checkpoint {
                id: id.clone(),
                seq,
                created_at: now,
                reason,
                frames: selection.frames,
                contexts: kept,
                bytes_used,
                tokens_used: super::estimate_tokens(bytes_used),
                budget,
            };

            let mut superseded = Vec::new();
            for previous in self.store.checkpoints().iter() {
                let previous = previous?;
                if !self.store.checkpoint_state().contains(previous.id.as_ref())? {
                    superseded.push(CheckpointState {
                        checkpoint_id: previous.id.clone(),
                        consumed_at: now,
                        consumption: Consumption::Superseded { by: id.clone() },
                    });
                }
            }

            self.store.commit_checkpoint(&checkpoint, &superseded)?;
            info!(
                checkpoint_id = %id,
                reason = %reason,
                frames = checkpoint.frames.len(),
                contexts = checkpoint.contexts.len(),
                bytes = checkpoint.bytes_used,
                "checkpoint created"
            );
            Ok(checkpoint)
        })
    }

    /// ACTIVE frames newest first, then recently closed frames.
    fn frame_candidates(&self, now: Millis) -> Result<Vec<FrameSummary>, ApiError> {
        let window_start = now.saturating_sub(self.policy.recent_window.as_millis() as u64);
        let mut active: Vec<Frame> = Vec::new();
        let mut closed: Vec<Frame> = Vec::new();
        for frame in self.store.frames().iter() {
            let frame = frame?;
            match frame.state {
                FrameState::Active => active.push(frame),
                FrameState::Closed if frame.closed_at.unwrap_or(0) >= window_start => {
                    closed.push(frame)
                }
                _ => {}
            }
        }
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        closed.sort_by(|a, b| b.closed_at.cmp(&a.closed_at).then_with(|| a.id.cmp(&b.id)));

        Ok(active
            .into_iter()
            .chain(closed)
            .map(|frame| FrameSummary {
                digest: frame
                    .digest_text
                    .as_deref()
                    .map(|d| excerpt(d, self.policy.excerpt_chars)),
                id: frame.id,
                parent_frame_id: frame.parent_frame_id,
                depth: frame.depth,
                name: frame.name,
                frame_type: frame.frame_type,
                state: frame.state,
                created_at: frame.created_at,
                closed_at: frame.closed_at,
            })
            .collect())
    }
}

fn bundle(checkpoint: Checkpoint) -> RehydrationBundle {
    let text = render(&checkpoint);
    RehydrationBundle {
        checkpoint_id: checkpoint.id,
        reason: checkpoint.reason,
        created_at: checkpoint.created_at,
        frames: checkpoint.frames,
        contexts: checkpoint.contexts,
        text,
    }
}

fn render(checkpoint: &Checkpoint) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "## Restored context (checkpoint {}, {}, {})",
        checkpoint.id,
        checkpoint.reason,
        format_millis(checkpoint.created_at)
    );

    if !checkpoint.frames.is_empty() {
        let _ = writeln!(out, "\n### Frames");
        for frame in &checkpoint.frames {
            let indent = "  ".repeat(frame.depth.min(8) as usize);
            let _ = writeln!(
                out,
                "{indent}- [{}] {} ({})",
                frame.state, frame.name, frame.frame_type
            );
            if let Some(digest) = &frame.digest {
                for line in digest.lines() {
                    let _ = writeln!(out, "{indent}  {line}");
                }
            }
        }
    }

    if !checkpoint.contexts.is_empty() {
        let _ = writeln!(out, "\n### Context");
        for entry in &checkpoint.contexts {
            let _ = writeln!(
                out,
                "- [{}] {} (score {:.2})",
                entry.context_type, entry.excerpt, entry.score
            );
        }
    }

    if checkpoint.frames.is_empty() && checkpoint.contexts.is_empty() {
        let _ = writeln!(out, "\nNo context captured yet.");
    }
    out
}
