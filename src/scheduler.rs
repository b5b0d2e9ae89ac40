//! Periodic maintenance scheduler
//!
//! Process-scoped, explicitly constructed state: the jobs, their intervals,
//! the time each last ran, and an in-flight flag per job. [`Scheduler::tick`]
//! is synchronous and driven by the injected clock, so tests step it by hand;
//! [`Scheduler::spawn`] drives it from a tokio task.

use crate::attention::{DecayEngine, SweepReport};
use crate::checkpoint::{CheckpointReason, RehydrationManager};
use crate::clock::SharedClock;
use crate::concurrency::{Deadline, InFlight};
use crate::error::ApiError;
use crate::frame::{FrameManager, OrphanReport};
use crate::types::{CheckpointId, Millis};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Decay,
    StaleSweep,
    Checkpoint,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Decay, JobKind::StaleSweep, JobKind::Checkpoint];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Decay => "decay",
            JobKind::StaleSweep => "stale_sweep",
            JobKind::Checkpoint => "checkpoint",
        }
    }

    fn index(self) -> usize {
        match self {
            JobKind::Decay => 0,
            JobKind::StaleSweep => 1,
            JobKind::Checkpoint => 2,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intervals per job; `None` disables the job.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub decay: Option<Duration>,
    pub stale_sweep: Option<Duration>,
    pub checkpoint: Option<Duration>,
    /// Frames ACTIVE longer than this are reported by the sweep.
    pub stale_after: Duration,
    /// Bound on each job run.
    pub job_deadline: Option<Duration>,
}

impl Schedule {
    fn interval(&self, kind: JobKind) -> Option<Duration> {
        match kind {
            JobKind::Decay => self.decay,
            JobKind::StaleSweep => self.stale_sweep,
            JobKind::Checkpoint => self.checkpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    Decay(SweepReport),
    StaleSweep(OrphanReport),
    Checkpoint(CheckpointId),
}

#[derive(Debug)]
pub enum JobOutcome {
    Ran { kind: JobKind, output: JobOutput },
    /// A previous run of the same kind is still in flight.
    Skipped { kind: JobKind },
    Failed { kind: JobKind, error: ApiError },
}

impl JobOutcome {
    pub fn kind(&self) -> JobKind {
        match self {
            JobOutcome::Ran { kind, .. }
            | JobOutcome::Skipped { kind }
            | JobOutcome::Failed { kind, .. } => *kind,
        }
    }
}

pub struct Scheduler {
    decay: DecayEngine,
    frames: FrameManager,
    checkpoints: RehydrationManager,
    clock: SharedClock,
    schedule: Schedule,
    last_run: Mutex<[Option<Millis>; 3]>,
    in_flight: [InFlight; 3],
}

impl Scheduler {
    pub fn new(
        decay: DecayEngine,
        frames: FrameManager,
        checkpoints: RehydrationManager,
        clock: SharedClock,
        schedule: Schedule,
    ) -> Self {
        Self {
            decay,
            frames,
            checkpoints,
            clock,
            schedule,
            last_run: Mutex::new([None; 3]),
            in_flight: [InFlight::new(), InFlight::new(), InFlight::new()],
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn last_run(&self, kind: JobKind) -> Option<Millis> {
        self.last_run.lock()[kind.index()]
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.in_flight[kind.index()].is_running()
    }

    /// Run every job whose interval has elapsed since its last run.
    ///
    /// A job that has never run is due immediately.
    pub fn tick(&self) -> Vec<JobOutcome> {
        let now = self.clock.now_ms();
        JobKind::ALL
            .into_iter()
            .filter(|kind| self.is_due(*kind, now))
            .map(|kind| self.run_job(kind))
            .collect()
    }

    /// Run one job now, unless a run of that kind is in flight.
    pub fn run_job(&self, kind: JobKind) -> JobOutcome {
        let Some(_guard) = self.in_flight[kind.index()].try_begin() else {
            warn!(job = %kind, "skipping job: previous run still in flight");
            return JobOutcome::Skipped { kind };
        };
        self.last_run.lock()[kind.index()] = Some(self.clock.now_ms());

        let deadline = self
            .schedule
            .job_deadline
            .map_or_else(Deadline::none, Deadline::after);
        let result = match kind {
            JobKind::Decay => self.decay.recompute_all(&deadline).map(JobOutput::Decay),
            JobKind::StaleSweep => self
                .frames
                .sweep_stale(self.schedule.stale_after)
                .map(JobOutput::StaleSweep),
            JobKind::Checkpoint => self
                .checkpoints
                .create_checkpoint(CheckpointReason::Periodic, None, &deadline)
                .map(JobOutput::Checkpoint),
        };

        match result {
            Ok(output) => {
                debug!(job = %kind, "job finished");
                JobOutcome::Ran { kind, output }
            }
            Err(err) => {
                error!(job = %kind, error = %err, "job failed");
                JobOutcome::Failed { kind, error: err }
            }
        }
    }

    fn is_due(&self, kind: JobKind, now: Millis) -> bool {
        let Some(interval) = self.schedule.interval(kind) else {
            return false;
        };
        match self.last_run(kind) {
            None => true,
            Some(at) => now.saturating_sub(at) >= interval.as_millis() as u64,
        }
    }

    /// Drive [`tick`](Self::tick) every `period` on the current tokio runtime.
    ///
    /// Each tick runs on the blocking pool; the loop waits for it before the
    /// next one, so ticks never overlap.
    pub fn spawn(self: Arc<Self>, period: Duration) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(period_ms = period.as_millis() as u64, "scheduler started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let scheduler = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || scheduler.tick()).await {
                            Ok(outcomes) => {
                                for outcome in outcomes.iter().filter(|o| matches!(o, JobOutcome::Failed { .. })) {
                                    debug!(job = %outcome.kind(), "tick reported failure");
                                }
                            }
                            Err(err) => error!(error = %err, "scheduler tick panicked"),
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("scheduler stopped");
        });
        SchedulerHandle { stop_tx, join }
    }
}

/// Stops a spawned scheduler loop.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for the current tick to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
    }
}
