//! CLI parse: clap types for stackmemory. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// StackMemory CLI - frame-structured context memory for coding sessions
#[derive(Parser)]
#[command(name = "stackmemory")]
#[command(about = "Local context memory with decay ranking, compaction detection, and rehydration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root directory
    #[arg(long, default_value = ".")]
    pub project: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a context item into a frame
    Capture {
        /// Context type (observation, decision, error, task, insight, reference, note)
        #[arg(long = "type", default_value = "note")]
        context_type: String,
        /// Owning frame id
        #[arg(long)]
        frame: String,
        /// Importance in [0, 1]; defaults per type
        #[arg(long)]
        importance: Option<f64>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// External reference as key=value (repeatable)
        #[arg(long = "ref")]
        refs: Vec<String>,
        /// Content text
        content: String,
    },
    /// Show one context item without counting an access
    Get {
        id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Ranked query over context items (counts an access on each result)
    Query {
        #[arg(long = "type")]
        context_type: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        frame: Option<String>,
        #[arg(long)]
        min_importance: Option<f64>,
        /// Terms that must all occur in the content
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Give up after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Text query logged to the attention log
    Recall {
        text: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Frame lifecycle and navigation
    Frame {
        #[command(subcommand)]
        command: FrameCommands,
    },
    /// Recompute decayed importance for every item
    Decay {
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
    /// Remove items not accessed within the retention window
    Prune {
        /// Overrides retention.max_age_days
        #[arg(long)]
        older_than_days: Option<u64>,
        /// Skip the JSON-lines backup
        #[arg(long)]
        no_backup: bool,
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
    /// Checkpoint management
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Render a checkpoint for a fresh session (latest if no id)
    Rehydrate {
        #[arg(long)]
        checkpoint: Option<String>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Read transcript text from stdin and rehydrate on compaction
    Detect {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Run due maintenance jobs once (decay, stale sweep, checkpoint)
    Maintain,
    /// Show memory status
    Status {
        #[arg(long, default_value = "text")]
        format: String,
        /// Number of top items to list
        #[arg(long, default_value = "5")]
        top: usize,
    },
    /// Print the effective configuration
    Config {
        /// Print config file locations instead
        #[arg(long)]
        paths: bool,
    },
}

#[derive(Subcommand)]
pub enum FrameCommands {
    /// Start a frame
    Start {
        name: String,
        #[arg(long = "type", default_value = "task")]
        frame_type: String,
        #[arg(long)]
        parent: Option<String>,
        /// Inputs as a JSON value
        #[arg(long)]
        inputs: Option<String>,
    },
    /// Close an active frame and compute its digest
    Close {
        id: String,
        /// Outputs as a JSON value
        #[arg(long)]
        outputs: Option<String>,
    },
    /// Abort a frame
    Abort {
        id: String,
        #[arg(long, default_value = "aborted")]
        reason: String,
    },
    /// Show one frame
    Show {
        id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List frames
    List {
        /// Filter by state (active, closed, aborted)
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the frame tree
    Tree,
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Create a checkpoint now
    Create {
        /// manual, periodic, or pre-clear
        #[arg(long, default_value = "manual")]
        reason: String,
        #[arg(long)]
        max_bytes: Option<usize>,
        #[arg(long)]
        max_tokens: Option<usize>,
    },
    /// List checkpoints, newest first
    List {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Acknowledge a checkpoint so retention may remove its items
    Consume { id: String },
}
