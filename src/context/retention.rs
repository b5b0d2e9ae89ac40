//! Retention sweep: batched, irreversible removal of long-unaccessed items.

use crate::checkpoint::protected_context_ids;
use crate::concurrency::Deadline;
use crate::context::{ContextItem, ContextStore};
use crate::error::{ApiError, StorageError};
use crate::types::{format_millis, Millis};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to do with items before they are deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupPolicy {
    Disabled,
    /// Append each batch as JSON lines to a timestamped file in `dir`.
    JsonLines { dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct PrunePolicy {
    pub batch_size: usize,
    pub backup: BackupPolicy,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            batch_size: 500,
            backup: BackupPolicy::Disabled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub scanned: usize,
    pub removed: usize,
    /// Expired items kept because an unconsumed checkpoint references them.
    pub protected_skipped: usize,
    pub batches: usize,
    /// The deadline stopped the sweep; completed batches stay applied.
    pub interrupted: bool,
    pub backup_file: Option<PathBuf>,
}

impl ContextStore {
    /// Remove items whose time since last access exceeds `max_age`.
    pub fn prune_older_than(
        &self,
        max_age: Duration,
        policy: &PrunePolicy,
        deadline: &Deadline,
    ) -> Result<PruneReport, ApiError> {
        let now = self.clock.now_ms();
        let cutoff = now.saturating_sub(max_age.as_millis() as u64);
        let batch_size = policy.batch_size.max(1);
        let keys = self.store.contexts().keys()?;
        let mut report = PruneReport::default();
        let mut backup = match &policy.backup {
            BackupPolicy::Disabled => None,
            BackupPolicy::JsonLines { dir } => Some(BackupWriter::new(dir, now)),
        };

        info!(
            total = keys.len(),
            cutoff = %format_millis(cutoff),
            batch_size,
            "starting retention sweep"
        );

        for chunk in keys.chunks(batch_size) {
            if deadline.is_expired() {
                report.interrupted = true;
                warn!(
                    removed = report.removed,
                    batches = report.batches,
                    "retention sweep interrupted by deadline"
                );
                break;
            }

            self.store.write(|| -> Result<(), ApiError> {
                // Re-read under the writer lock so a checkpoint created since the
                // last batch protects its items.
                let protected = protected_context_ids(&self.store)?;
                let mut doomed: Vec<ContextItem> = Vec::new();
                for key in chunk {
                    let Some(item) = self.store.contexts().get(key)? else {
                        continue;
                    };
                    report.scanned += 1;
                    if !is_expired(&item, cutoff) {
                        continue;
                    }
                    if protected.contains(&item.id) {
                        report.protected_skipped += 1;
                        continue;
                    }
                    doomed.push(item);
                }
                if doomed.is_empty() {
                    return Ok(());
                }

                if let Some(writer) = backup.as_mut() {
                    writer.append(&doomed)?;
                }
                let writes = doomed
                    .iter()
                    .map(|item| (item.id.as_ref().to_vec(), None))
                    .collect();
                self.store.contexts().apply(writes)?;
                report.removed += doomed.len();
                Ok(())
            })?;

            report.batches += 1;
            debug!(batch = report.batches, removed = report.removed, "retention batch applied");
        }

        report.backup_file = backup.and_then(|w| w.written_path());
        info!(
            scanned = report.scanned,
            removed = report.removed,
            protected_skipped = report.protected_skipped,
            interrupted = report.interrupted,
            "retention sweep finished"
        );
        Ok(report)
    }
}

fn is_expired(item: &ContextItem, cutoff: Millis) -> bool {
    item.last_accessed < cutoff
}

/// Lazily created JSON-lines backup file.
struct BackupWriter {
    path: PathBuf,
    written: bool,
}

impl BackupWriter {
    fn new(dir: &Path, now: Millis) -> Self {
        Self {
            path: dir.join(format!("prune-{now:013}.jsonl")),
            written: false,
        }
    }

    fn append(&mut self, items: &[ContextItem]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);
        for item in items {
            let line = serde_json::to_string(item).map_err(|e| StorageError::Encode {
                table: "contexts",
                message: e.to_string(),
            })?;
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
        self.written = true;
        Ok(())
    }

    fn written_path(self) -> Option<PathBuf> {
        self.written.then_some(self.path)
    }
}
