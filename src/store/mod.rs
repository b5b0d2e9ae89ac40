//! Project Store
//!
//! One sled database per project root holding the four logical tables
//! (contexts, frames, attention, checkpoints) plus checkpoint consumption
//! markers. All writes go through [`ProjectStore::write`], the single-writer
//! boundary; reads go straight to sled and always see whole values.

pub mod persistence;

pub use persistence::{Codec, Table};

use crate::attention::AttentionLogEntry;
use crate::checkpoint::{Checkpoint, CheckpointState};
use crate::context::ContextItem;
use crate::concurrency::Deadline;
use crate::error::{ApiError, StorageError};
use crate::frame::Frame;
use parking_lot::{Mutex, MutexGuard};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TABLE_CONTEXTS: &str = "contexts";
pub const TABLE_FRAMES: &str = "frames";
pub const TABLE_ATTENTION: &str = "attention";
pub const TABLE_CHECKPOINTS: &str = "checkpoints";
pub const TABLE_CHECKPOINT_STATE: &str = "checkpoint_state";

/// Durable store for one project root.
pub struct ProjectStore {
    project_root: PathBuf,
    store_path: Option<PathBuf>,
    db: sled::Db,
    contexts: Table<ContextItem>,
    frames: Table<Frame>,
    attention: Table<AttentionLogEntry>,
    checkpoints: Table<Checkpoint>,
    checkpoint_state: Table<CheckpointState>,
    writer: Mutex<()>,
}

impl ProjectStore {
    /// Open (or create) the store for `project_root` at `store_path`.
    pub fn open(project_root: &Path, store_path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(store_path)?;
        let db = sled::open(store_path).map_err(persistence::backend("db", "open"))?;
        info!(
            project = %project_root.display(),
            store = %store_path.display(),
            "opened project store"
        );
        Self::from_db(project_root, Some(store_path.to_path_buf()), db)
    }

    /// In-memory store that is discarded on drop.
    pub fn temporary(project_root: &Path) -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(persistence::backend("db", "open"))?;
        Self::from_db(project_root, None, db)
    }

    fn from_db(
        project_root: &Path,
        store_path: Option<PathBuf>,
        db: sled::Db,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            project_root: project_root.to_path_buf(),
            store_path,
            contexts: Table::open(&db, TABLE_CONTEXTS, Codec::Bincode)?,
            frames: Table::open(&db, TABLE_FRAMES, Codec::Json)?,
            attention: Table::open(&db, TABLE_ATTENTION, Codec::Bincode)?,
            checkpoints: Table::open(&db, TABLE_CHECKPOINTS, Codec::Json)?,
            checkpoint_state: Table::open(&db, TABLE_CHECKPOINT_STATE, Codec::Json)?,
            db,
            writer: Mutex::new(()),
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// On-disk location, `None` for temporary stores.
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    pub fn contexts(&self) -> &Table<ContextItem> {
        &self.contexts
    }

    pub fn frames(&self) -> &Table<Frame> {
        &self.frames
    }

    pub fn attention(&self) -> &Table<AttentionLogEntry> {
        &self.attention
    }

    pub fn checkpoints(&self) -> &Table<Checkpoint> {
        &self.checkpoints
    }

    pub fn checkpoint_state(&self) -> &Table<CheckpointState> {
        &self.checkpoint_state
    }

    /// Run `f` inside the single-writer section.
    ///
    /// Read-modify-write sequences must happen entirely inside `f` so that
    /// concurrent writers never lose each other's updates.
    pub fn write<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let _guard = self.writer_guard();
        f()
    }

    /// [`write`](Self::write), giving up with `DeadlineExceeded` if the
    /// writer section cannot be entered before `deadline`.
    pub fn write_within<T>(
        &self,
        deadline: &Deadline,
        operation: &'static str,
        f: impl FnOnce() -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        deadline.check(operation)?;
        let _guard = match deadline.remaining() {
            None => self.writer_guard(),
            Some(left) => self
                .writer
                .try_lock_for(left)
                .ok_or(ApiError::DeadlineExceeded { operation })?,
        };
        f()
    }

    /// Next value of the store-wide monotonic sequence. Survives reopen.
    pub fn next_sequence(&self) -> Result<u64, StorageError> {
        self.db
            .generate_id()
            .map_err(persistence::backend("db", "generate_id"))
    }

    /// Insert `checkpoint` and the consumption markers of the checkpoints it
    /// supersedes in one transaction over both checkpoint trees.
    pub fn commit_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        superseded: &[CheckpointState],
    ) -> Result<(), StorageError> {
        let record = self.checkpoints.encode(checkpoint)?;
        let markers = superseded
            .iter()
            .map(|state| {
                let value = self.checkpoint_state.encode(state)?;
                Ok((state.checkpoint_id.as_ref().to_vec(), value))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        (self.checkpoints.tree(), self.checkpoint_state.tree())
            .transaction(|(checkpoints, states)| {
                checkpoints.insert(checkpoint.id.as_ref(), record.as_slice())?;
                for (key, value) in &markers {
                    states.insert(key.as_slice(), value.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<Infallible>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(source) => StorageError::Backend {
                    table: TABLE_CHECKPOINTS,
                    operation: "transaction",
                    source,
                },
                TransactionError::Abort(never) => match never {},
            })
    }

    fn writer_guard(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        let bytes = self
            .db
            .flush()
            .map_err(persistence::backend("db", "flush"))?;
        debug!(bytes, "flushed project store");
        Ok(())
    }
}
