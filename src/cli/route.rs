//! CLI route: single route table and run context. Dispatches to engine
//! components and presentation.

use crate::checkpoint::CheckpointReason;
use crate::cli::parse::{CheckpointCommands, Commands, FrameCommands};
use crate::cli::presentation::{
    format_bundle, format_checkpoints_text, format_frame_text, format_frame_tree,
    format_frames_text, format_input_check, format_item_text, format_items_text,
    format_maintenance, to_json,
};
use crate::cli::command_name;
use crate::concurrency::Deadline;
use crate::config::{global_config_path, project_config_path, ConfigLoader, StackConfig};
use crate::context::{BackupPolicy, ContextFilter, ContextType, NewContext};
use crate::engine::MemoryEngine;
use crate::error::ApiError;
use crate::frame::FrameState;
use crate::status::{build_status, format_status_text, StatusOptions};
use crate::types::{CheckpointId, ContextId, FrameId};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Runtime context for CLI execution: project root, config, and the engine.
pub struct RunContext {
    engine: MemoryEngine,
    project_root: PathBuf,
    config_path: Option<PathBuf>,
}

impl RunContext {
    /// Load configuration and open the project store.
    pub fn new(project_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = load_config(&project_root, config_path.as_ref())?;
        let engine = MemoryEngine::open(&project_root, config)?;
        Ok(Self {
            engine,
            project_root,
            config_path,
        })
    }

    pub fn from_engine(engine: MemoryEngine) -> Self {
        Self {
            project_root: engine.project_root().to_path_buf(),
            engine,
            config_path: None,
        }
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.execute_inner(command);
        debug!(
            command = %name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );
        self.engine.flush()?;
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Capture {
                context_type,
                frame,
                importance,
                tags,
                refs,
                content,
            } => {
                let mut request = NewContext::new(
                    context_type.parse::<ContextType>()?,
                    content.clone(),
                    FrameId::from(frame.as_str()),
                )
                .tags(tags.iter().cloned());
                request.importance = *importance;
                for spec in refs {
                    let (key, value) = spec.split_once('=').ok_or_else(|| {
                        ApiError::validation(format!("external reference '{}' must be key=value", spec))
                    })?;
                    request = request.external_ref(key.trim(), value.trim());
                }
                Ok(self.engine.contexts().add(request)?.to_string())
            }
            Commands::Get { id, format } => {
                let item = self.engine.contexts().get_context(&ContextId::from(id.as_str()))?;
                if format == "json" {
                    to_json(&item)
                } else {
                    Ok(format_item_text(&item))
                }
            }
            Commands::Query {
                context_type,
                tags,
                frame,
                min_importance,
                text,
                limit,
                deadline_ms,
                format,
            } => {
                let filter = ContextFilter {
                    context_type: context_type
                        .as_deref()
                        .map(str::parse::<ContextType>)
                        .transpose()?,
                    tags: tags.clone(),
                    frame_id: frame.as_deref().map(FrameId::from),
                    min_importance: *min_importance,
                    text: text.clone(),
                    limit: *limit,
                };
                let items = self
                    .engine
                    .contexts()
                    .query_contexts(&filter, &deadline(*deadline_ms))?;
                if format == "json" {
                    to_json(&items)
                } else {
                    Ok(format_items_text(&items))
                }
            }
            Commands::Recall { text, format } => {
                let ids = self
                    .engine
                    .attention()
                    .record_query(text, &Deadline::none())?;
                let items = ids
                    .iter()
                    .map(|id| self.engine.contexts().get_context(id))
                    .collect::<Result<Vec<_>, _>>()?;
                if format == "json" {
                    to_json(&items)
                } else {
                    Ok(format_items_text(&items))
                }
            }
            Commands::Frame { command } => self.handle_frame_command(command),
            Commands::Decay { deadline_ms } => {
                let report = self.engine.recompute_decay(&deadline(*deadline_ms))?;
                to_json(&report)
            }
            Commands::Prune {
                older_than_days,
                no_backup,
                deadline_ms,
            } => {
                let retention = &self.engine.config().retention;
                let mut policy = retention.prune_policy(&self.engine.config().storage)?;
                if *no_backup {
                    policy.backup = BackupPolicy::Disabled;
                }
                let max_age = older_than_days
                    .map(|days| Duration::from_secs(days.saturating_mul(24 * 3600)))
                    .unwrap_or_else(|| retention.max_age());
                let report = self.engine.contexts().prune_older_than(
                    max_age,
                    &policy,
                    &deadline(*deadline_ms),
                )?;
                info!(removed = report.removed, "prune complete");
                to_json(&report)
            }
            Commands::Checkpoint { command } => self.handle_checkpoint_command(command),
            Commands::Rehydrate { checkpoint, format } => {
                let id = checkpoint.as_deref().map(CheckpointId::from);
                let bundle = self
                    .engine
                    .rehydration()
                    .rehydrate(id.as_ref(), &Deadline::none())?;
                format_bundle(&bundle, format)
            }
            Commands::Detect { format } => {
                let text = read_transcript(std::io::stdin().lock(), "stdin")?;
                let check = self.engine.check_input(&text)?;
                format_input_check(&check, format)
            }
            Commands::Maintain => Ok(format_maintenance(&self.engine.scheduler().tick())),
            Commands::Status { format, top } => {
                let options = StatusOptions {
                    top_n: *top,
                    ..StatusOptions::default()
                };
                let status = build_status(&self.engine, &options)?;
                if format == "json" {
                    to_json(&status)
                } else {
                    Ok(format_status_text(&status))
                }
            }
            Commands::Config { paths } => {
                if *paths {
                    Ok(self.format_config_paths())
                } else {
                    self.engine.config().to_toml()
                }
            }
        }
    }

    fn handle_frame_command(&self, command: &FrameCommands) -> Result<String, ApiError> {
        let frames = self.engine.frames();
        match command {
            FrameCommands::Start {
                name,
                frame_type,
                parent,
                inputs,
            } => {
                let parent = parent.as_deref().map(FrameId::from);
                let inputs = parse_json_arg("inputs", inputs.as_deref())?;
                Ok(frames
                    .start_with_inputs(name, frame_type, parent.as_ref(), inputs)?
                    .to_string())
            }
            FrameCommands::Close { id, outputs } => {
                let outputs = parse_json_arg("outputs", outputs.as_deref())?;
                let frame = frames.close(&FrameId::from(id.as_str()), outputs)?;
                Ok(frame.digest_text.unwrap_or_default())
            }
            FrameCommands::Abort { id, reason } => {
                let frame = frames.abort(&FrameId::from(id.as_str()), reason)?;
                Ok(format!("{} {}", frame.id, frame.state))
            }
            FrameCommands::Show { id, format } => {
                let frame = frames.get(&FrameId::from(id.as_str()))?;
                if format == "json" {
                    to_json(&frame)
                } else {
                    Ok(format_frame_text(&frame))
                }
            }
            FrameCommands::List { state, format } => {
                let state = state.as_deref().map(str::parse::<FrameState>).transpose()?;
                let list = frames.list(state)?;
                if format == "json" {
                    to_json(&list)
                } else {
                    Ok(format_frames_text(&list))
                }
            }
            FrameCommands::Tree => Ok(format_frame_tree(&frames.list(None)?)),
        }
    }

    fn handle_checkpoint_command(&self, command: &CheckpointCommands) -> Result<String, ApiError> {
        let rehydration = self.engine.rehydration();
        match command {
            CheckpointCommands::Create {
                reason,
                max_bytes,
                max_tokens,
            } => {
                let mut budget = rehydration.default_budget();
                if let Some(bytes) = max_bytes {
                    budget.max_bytes = *bytes;
                }
                if let Some(tokens) = max_tokens {
                    budget.max_tokens = *tokens;
                }
                let id = rehydration.create_checkpoint(
                    reason.parse::<CheckpointReason>()?,
                    Some(budget),
                    &Deadline::none(),
                )?;
                Ok(id.to_string())
            }
            CheckpointCommands::List { format } => {
                let checkpoints = rehydration.list_checkpoints()?;
                if format == "json" {
                    to_json(&checkpoints)
                } else {
                    Ok(format_checkpoints_text(&checkpoints))
                }
            }
            CheckpointCommands::Consume { id } => {
                rehydration.mark_consumed(&CheckpointId::from(id.as_str()))?;
                Ok(json!({ "consumed": id }).to_string())
            }
        }
    }

    fn format_config_paths(&self) -> String {
        let show = |path: Option<PathBuf>| {
            path.map(|p| {
                let marker = if p.exists() { "" } else { " (missing)" };
                format!("{}{}", p.display(), marker)
            })
            .unwrap_or_else(|| "-".to_string())
        };
        let mut out = String::new();
        if let Some(path) = &self.config_path {
            out.push_str(&format!("explicit: {}\n", show(Some(path.clone()))));
        } else {
            out.push_str(&format!("global: {}\n", show(global_config_path())));
            out.push_str(&format!(
                "project: {}\n",
                show(Some(project_config_path(&self.project_root)))
            ));
        }
        out.push_str(&format!(
            "store: {}",
            self.engine
                .store_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(temporary)".to_string())
        ));
        out
    }
}

/// Load config from an explicit file or from the layered project sources.
pub fn load_config(
    project_root: &std::path::Path,
    config_path: Option<&PathBuf>,
) -> Result<StackConfig, ApiError> {
    match config_path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(project_root),
    }
}

fn deadline(ms: Option<u64>) -> Deadline {
    ms.map_or_else(Deadline::none, |ms| Deadline::after(Duration::from_millis(ms)))
}

fn read_transcript(mut reader: impl Read, source_name: &'static str) -> Result<String, ApiError> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|source| ApiError::InputError { source_name, source })?;
    Ok(text)
}

fn parse_json_arg(name: &str, raw: Option<&str>) -> Result<Value, ApiError> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ApiError::validation(format!("--{} is not valid JSON: {}", name, e))),
    }
}
