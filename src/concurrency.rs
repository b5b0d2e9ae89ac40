//! Concurrency primitives: deadlines, the per-project checkpoint lock, and
//! in-flight flags for background work.

use crate::error::ApiError;
use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Optional bound after which long scans stop.
///
/// A deadline expires at a wall-clock instant, after a fixed number of
/// expiry polls, or whichever comes first. Batched sweeps poll once per
/// batch, so a poll bound caps how many batches one run applies.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    polls_left: Option<Arc<AtomicUsize>>,
}

impl Deadline {
    /// No deadline: the operation runs to completion.
    pub fn none() -> Self {
        Deadline::default()
    }

    pub fn after(duration: Duration) -> Self {
        Deadline::at(Instant::now() + duration)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline {
            at: Some(instant),
            polls_left: None,
        }
    }

    /// Expire once `polls` calls to [`is_expired`](Self::is_expired) have
    /// passed. Clones share the remaining count.
    pub fn after_polls(polls: usize) -> Self {
        Deadline {
            at: None,
            polls_left: Some(Arc::new(AtomicUsize::new(polls))),
        }
    }

    pub fn is_expired(&self) -> bool {
        if self.at.is_some_and(|at| Instant::now() >= at) {
            return true;
        }
        match &self.polls_left {
            Some(left) => left
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_err(),
            None => false,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Shorten `wait` so it never runs past the deadline.
    pub fn clamp(&self, wait: Duration) -> Duration {
        match self.remaining() {
            Some(left) => wait.min(left),
            None => wait,
        }
    }

    /// Fail with `DeadlineExceeded` if the deadline has passed.
    pub fn check(&self, operation: &'static str) -> Result<(), ApiError> {
        if self.is_expired() {
            Err(ApiError::DeadlineExceeded { operation })
        } else {
            Ok(())
        }
    }
}

/// Retry policy for acquiring the checkpoint lock
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    /// Wait per attempt
    pub timeout: Duration,
    /// Number of attempts before surfacing a concurrency error
    pub attempts: u32,
    /// Sleep before the second attempt; doubles after each failure
    pub backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Mutual exclusion for checkpoint creation and rehydration of one project.
///
/// Never nested: holders only do local selection and serialization work.
pub struct ProjectLock {
    project_root: PathBuf,
    mutex: Mutex<()>,
    policy: LockPolicy,
}

impl ProjectLock {
    pub fn new(project_root: impl Into<PathBuf>, policy: LockPolicy) -> Self {
        Self {
            project_root: project_root.into(),
            mutex: Mutex::new(()),
            policy,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Block until the lock is free, retrying with bounded backoff.
    pub fn acquire(&self, deadline: &Deadline) -> Result<MutexGuard<'_, ()>, ApiError> {
        let attempts = self.policy.attempts.max(1);
        let mut backoff = self.policy.backoff;

        for attempt in 1..=attempts {
            let wait = deadline.clamp(self.policy.timeout);
            if let Some(guard) = self.mutex.try_lock_for(wait) {
                if attempt > 1 {
                    debug!(attempt, project = %self.project_root.display(), "checkpoint lock acquired after retry");
                }
                return Ok(guard);
            }

            warn!(
                attempt,
                attempts,
                project = %self.project_root.display(),
                "checkpoint lock busy"
            );
            if attempt == attempts || deadline.is_expired() {
                break;
            }
            std::thread::sleep(deadline.clamp(backoff));
            backoff = backoff.saturating_mul(2);
        }

        Err(ApiError::Concurrency(format!(
            "checkpoint lock for {} still held after {} attempts",
            self.project_root.display(),
            attempts
        )))
    }
}

/// Flag marking a kind of background work as running.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

impl InFlight {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Claim the flag; `None` if a run is already in flight.
    pub fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the in-flight flag on drop, including on panic unwind.
pub struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
