//! StackMemory: Context Memory Engine
//!
//! Local, per-project memory for AI coding sessions. Captured context items
//! live inside a tree of task frames, importance decays with time and grows
//! with use, compaction of the conversation is detected from transcript
//! text, and budgeted checkpoints rehydrate the most relevant state into a
//! fresh session.

pub mod attention;
pub mod checkpoint;
pub mod cli;
pub mod clock;
pub mod compaction;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod frame;
pub mod logging;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod types;

pub use engine::{InputCheck, MemoryEngine};
pub use error::{ApiError, StorageError};
