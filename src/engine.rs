//! Memory engine facade
//!
//! Opens one project store and wires every component to it with a shared
//! clock and the loaded configuration. `MemoryEngine` is `Send + Sync`;
//! callers share it behind an `Arc`.

use crate::attention::{AttentionTracker, DecayEngine, DecayModel, SweepReport};
use crate::checkpoint::{RehydrationBundle, RehydrationManager};
use crate::clock::{system_clock, SharedClock};
use crate::compaction::{CheckOutcome, CompactionMonitor};
use crate::concurrency::{Deadline, ProjectLock};
use crate::config::StackConfig;
use crate::context::{ContextStore, PruneReport};
use crate::error::ApiError;
use crate::frame::FrameManager;
use crate::scheduler::Scheduler;
use crate::store::ProjectStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Result of feeding transcript text to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct InputCheck {
    pub outcome: CheckOutcome,
    /// Present when the detection triggered a rehydration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<RehydrationBundle>,
}

pub struct MemoryEngine {
    config: StackConfig,
    clock: SharedClock,
    store: Arc<ProjectStore>,
    contexts: ContextStore,
    frames: FrameManager,
    attention: AttentionTracker,
    decay: DecayEngine,
    rehydration: RehydrationManager,
    monitor: CompactionMonitor,
    scheduler: Arc<Scheduler>,
}

impl MemoryEngine {
    /// Open the store for `project_root` at the configured location.
    pub fn open(project_root: &Path, config: StackConfig) -> Result<Self, ApiError> {
        Self::open_with_clock(project_root, config, system_clock())
    }

    pub fn open_with_clock(
        project_root: &Path,
        config: StackConfig,
        clock: SharedClock,
    ) -> Result<Self, ApiError> {
        let store_path = config.storage.resolve_store_path(project_root)?;
        let store = ProjectStore::open(project_root, &store_path)?;
        Self::assemble(config, clock, store)
    }

    /// In-memory engine; nothing survives drop.
    pub fn temporary(
        project_root: &Path,
        config: StackConfig,
        clock: SharedClock,
    ) -> Result<Self, ApiError> {
        let store = ProjectStore::temporary(project_root)?;
        Self::assemble(config, clock, store)
    }

    fn assemble(config: StackConfig, clock: SharedClock, store: ProjectStore) -> Result<Self, ApiError> {
        let config = config.validated()?;
        let store = Arc::new(store);
        let model = DecayModel::new(config.decay.half_life()?, config.decay.access_weight);

        let contexts = ContextStore::new(Arc::clone(&store), Arc::clone(&clock), model);
        let frames = FrameManager::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            contexts.clone(),
            config.frames.digest_top_k,
        );
        let attention = AttentionTracker::new(contexts.clone(), Arc::clone(&clock));
        let decay = DecayEngine::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            model,
            config.decay.batch_size,
        );
        let lock = Arc::new(ProjectLock::new(
            store.project_root(),
            config.checkpoint.lock_policy(),
        ));
        let rehydration = RehydrationManager::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            contexts.clone(),
            lock,
            config.checkpoint.budget(),
            config.checkpoint.selection_policy(),
        );
        let monitor = CompactionMonitor::new(Arc::clone(&clock), config.compaction.cooldown());
        let scheduler = Arc::new(Scheduler::new(
            decay.clone(),
            frames.clone(),
            rehydration.clone(),
            Arc::clone(&clock),
            config.scheduler.schedule(&config.frames),
        ));

        info!(project = %store.project_root().display(), "memory engine ready");
        Ok(Self {
            config,
            clock,
            store,
            contexts,
            frames,
            attention,
            decay,
            rehydration,
            monitor,
            scheduler,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn project_root(&self) -> &Path {
        self.store.project_root()
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store.store_path()
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn frames(&self) -> &FrameManager {
        &self.frames
    }

    pub fn attention(&self) -> &AttentionTracker {
        &self.attention
    }

    pub fn decay(&self) -> &DecayEngine {
        &self.decay
    }

    pub fn rehydration(&self) -> &RehydrationManager {
        &self.rehydration
    }

    pub fn monitor(&self) -> &CompactionMonitor {
        &self.monitor
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Watch incoming transcript text; rehydrate when compaction is detected
    /// outside the cooldown window.
    pub fn check_input(&self, text: &str) -> Result<InputCheck, ApiError> {
        let outcome = self.monitor.check_input(text);
        let bundle = if outcome.triggered {
            Some(self.rehydration.rehydrate(None, &Deadline::none())?)
        } else {
            None
        };
        Ok(InputCheck { outcome, bundle })
    }

    /// Retention sweep with the configured age and backup policy.
    pub fn prune(&self, deadline: &Deadline) -> Result<PruneReport, ApiError> {
        let policy = self.config.retention.prune_policy(&self.config.storage)?;
        self.contexts
            .prune_older_than(self.config.retention.max_age(), &policy, deadline)
    }

    pub fn recompute_decay(&self, deadline: &Deadline) -> Result<SweepReport, ApiError> {
        self.decay.recompute_all(deadline)
    }

    pub fn flush(&self) -> Result<(), ApiError> {
        Ok(self.store.flush()?)
    }
}
