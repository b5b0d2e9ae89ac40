//! Decay Engine
//!
//! Importance decays exponentially with time since last access and is
//! reinforced logarithmically by access count:
//!
//! `score = base * exp(-λ * age_secs) + β * ln(1 + access_count)`, clamped to
//! [0, 1], with `λ = ln 2 / half_life`.

use crate::clock::SharedClock;
use crate::concurrency::Deadline;
use crate::context::ContextItem;
use crate::error::ApiError;
use crate::store::ProjectStore;
use crate::types::Millis;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters of the decay formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayModel {
    /// Decay rate per second.
    lambda: f64,
    access_weight: f64,
}

impl DecayModel {
    pub fn new(half_life: Duration, access_weight: f64) -> Self {
        let half_life_secs = half_life.as_secs_f64();
        let lambda = if half_life_secs > 0.0 {
            std::f64::consts::LN_2 / half_life_secs
        } else {
            f64::INFINITY
        };
        Self {
            lambda,
            access_weight: if access_weight.is_finite() {
                access_weight.max(0.0)
            } else {
                0.0
            },
        }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn access_weight(&self) -> f64 {
        self.access_weight
    }

    /// Decayed score for the raw inputs.
    pub fn score(&self, base_importance: f64, age_secs: f64, access_count: u64) -> f64 {
        let base = clamp01(base_importance);
        let age = if age_secs.is_nan() { 0.0 } else { age_secs.max(0.0) };
        let decayed = if self.lambda.is_infinite() {
            if age > 0.0 {
                0.0
            } else {
                base
            }
        } else {
            base * (-self.lambda * age).exp()
        };
        let reinforcement = self.access_weight * (access_count as f64).ln_1p();
        clamp01(decayed + reinforcement)
    }

    pub fn score_item(&self, item: &ContextItem, now: Millis) -> f64 {
        let age_ms = now.saturating_sub(item.last_accessed);
        self.score(item.base_importance, age_ms as f64 / 1000.0, item.access_count)
    }
}

/// Clamp into [0, 1]; NaN maps to 0, infinities to the nearest bound.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub updated: usize,
    pub batches: usize,
    pub interrupted: bool,
}

/// Recomputes stored importance for every live item.
#[derive(Clone)]
pub struct DecayEngine {
    store: Arc<ProjectStore>,
    clock: SharedClock,
    model: DecayModel,
    batch_size: usize,
}

impl DecayEngine {
    pub fn new(
        store: Arc<ProjectStore>,
        clock: SharedClock,
        model: DecayModel,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            clock,
            model,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model(&self) -> &DecayModel {
        &self.model
    }

    /// Full pass in batches, each applied atomically.
    ///
    /// Rows are replaced whole, so concurrent readers see either the old or
    /// the new importance. When the deadline passes, finished batches keep
    /// their updates and the rest are left untouched.
    pub fn recompute_all(&self, deadline: &Deadline) -> Result<SweepReport, ApiError> {
        let keys = self.store.contexts().keys()?;
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();

        for chunk in keys.chunks(self.batch_size) {
            if deadline.is_expired() {
                report.interrupted = true;
                warn!(
                    updated = report.updated,
                    batches = report.batches,
                    "decay recompute interrupted by deadline"
                );
                break;
            }

            self.store.write(|| -> Result<(), ApiError> {
                let mut writes = Vec::new();
                for key in chunk {
                    // Removed since the key snapshot was taken.
                    let Some(mut item) = self.store.contexts().get(key)? else {
                        continue;
                    };
                    report.scanned += 1;
                    let score = self.model.score_item(&item, now);
                    if score != item.importance {
                        item.importance = score;
                        writes.push((key.clone(), Some(item)));
                    }
                }
                report.updated += writes.len();
                self.store.contexts().apply(writes)?;
                Ok(())
            })?;

            report.batches += 1;
            debug!(batch = report.batches, updated = report.updated, "decay batch applied");
        }

        info!(
            scanned = report.scanned,
            updated = report.updated,
            interrupted = report.interrupted,
            "decay recompute finished"
        );
        Ok(report)
    }
}
