//! Configuration System
//!
//! Layered configuration: built-in defaults, the global file
//! (`~/.config/stackmemory/config.toml`), the project file
//! (`<root>/.stackmemory/config.toml`), then `STACKMEMORY__SECTION__KEY`
//! environment variables. Each section also converts itself into the typed
//! parameters the engine components take.

use crate::checkpoint::manager::SelectionPolicy;
use crate::checkpoint::CheckpointBudget;
use crate::concurrency::LockPolicy;
use crate::context::{BackupPolicy, PrunePolicy};
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::scheduler::Schedule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;
pub use sources::project_file::project_config_path;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Longest accepted half-life: one hundred years.
pub const MAX_HALF_LIFE_HOURS: f64 = 100.0 * 365.0 * 24.0;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub frames: FramesConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where project stores live
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overrides the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> Result<PathBuf, ApiError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("ai", "stackmemory", "stackmemory")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                ApiError::ConfigError("Could not determine a data directory; set storage.data_dir".to_string())
            })
    }

    /// `<data_dir>/projects/<hash of canonical root>/store`
    pub fn resolve_store_path(&self, project_root: &Path) -> Result<PathBuf, ApiError> {
        Ok(self
            .data_dir()?
            .join("projects")
            .join(project_key(project_root))
            .join("store"))
    }
}

/// Stable per-project directory name: first 16 hex chars of the blake3 hash of
/// the canonical root path.
pub fn project_key(project_root: &Path) -> String {
    let canonical = dunce::canonicalize(project_root).unwrap_or_else(|_| project_root.to_path_buf());
    let digest = blake3::hash(canonical.to_string_lossy().as_bytes());
    digest.to_hex()[..16].to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub half_life_hours: f64,
    pub access_weight: f64,
    pub batch_size: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_hours: 7.0 * 24.0,
            access_weight: 0.05,
            batch_size: 500,
        }
    }
}

impl DecayConfig {
    pub fn half_life(&self) -> Result<Duration, ApiError> {
        Duration::try_from_secs_f64(self.half_life_hours * HOUR as f64).map_err(|e| {
            ApiError::ConfigError(format!(
                "decay.half_life_hours {} is not a usable duration: {}",
                self.half_life_hours, e
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_days: u64,
    pub batch_size: usize,
    pub backup_before_prune: bool,
    /// Defaults to `<data_dir>/backups`.
    pub backup_dir: Option<PathBuf>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 90,
            batch_size: 500,
            backup_before_prune: true,
            backup_dir: None,
        }
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days.saturating_mul(DAY))
    }

    pub fn prune_policy(&self, storage: &StorageConfig) -> Result<PrunePolicy, ApiError> {
        let backup = if self.backup_before_prune {
            let dir = match &self.backup_dir {
                Some(dir) => dir.clone(),
                None => storage.data_dir()?.join("backups"),
            };
            BackupPolicy::JsonLines { dir }
        } else {
            BackupPolicy::Disabled
        };
        Ok(PrunePolicy {
            batch_size: self.batch_size,
            backup,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    pub stale_after_hours: u64,
    pub digest_top_k: usize,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: 24,
            digest_top_k: 5,
        }
    }
}

impl FramesConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_hours.saturating_mul(HOUR))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub max_bytes: usize,
    pub max_tokens: usize,
    pub max_frames: usize,
    pub max_items: usize,
    pub recent_window_hours: u64,
    pub excerpt_chars: usize,
    pub lock_timeout_ms: u64,
    pub lock_attempts: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        let budget = CheckpointBudget::default();
        Self {
            max_bytes: budget.max_bytes,
            max_tokens: budget.max_tokens,
            max_frames: budget.max_frames,
            max_items: budget.max_items,
            recent_window_hours: 24,
            excerpt_chars: 280,
            lock_timeout_ms: 5_000,
            lock_attempts: 3,
        }
    }
}

impl CheckpointConfig {
    pub fn budget(&self) -> CheckpointBudget {
        CheckpointBudget {
            max_bytes: self.max_bytes,
            max_tokens: self.max_tokens,
            max_frames: self.max_frames,
            max_items: self.max_items,
        }
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            recent_window: Duration::from_secs(self.recent_window_hours.saturating_mul(HOUR)),
            excerpt_chars: self.excerpt_chars,
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            timeout: Duration::from_millis(self.lock_timeout_ms),
            attempts: self.lock_attempts,
            ..LockPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub cooldown_secs: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self { cooldown_secs: 30 }
    }
}

impl CompactionConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Periodic job intervals; 0 disables a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub decay_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub checkpoint_interval_secs: u64,
    pub job_deadline_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            decay_interval_secs: HOUR,
            sweep_interval_secs: 15 * 60,
            checkpoint_interval_secs: 30 * 60,
            job_deadline_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn schedule(&self, frames: &FramesConfig) -> Schedule {
        let interval = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Schedule {
            decay: interval(self.decay_interval_secs),
            stale_sweep: interval(self.sweep_interval_secs),
            checkpoint: interval(self.checkpoint_interval_secs),
            stale_after: frames.stale_after(),
            job_deadline: interval(self.job_deadline_secs),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub section: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.section, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl StackConfig {
    /// Validate the entire configuration, collecting every violation
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, section: &'static str, message: &str| {
            if !ok {
                errors.push(ValidationError {
                    section,
                    message: message.to_string(),
                });
            }
        };

        if let Some(dir) = &self.storage.data_dir {
            check(!dir.as_os_str().is_empty(), "storage", "data_dir cannot be empty");
        }

        let decay = &self.decay;
        check(
            decay.half_life_hours.is_finite()
                && decay.half_life_hours > 0.0
                && decay.half_life_hours <= MAX_HALF_LIFE_HOURS,
            "decay",
            &format!("half_life_hours must be within (0, {MAX_HALF_LIFE_HOURS}]"),
        );
        check(
            decay.access_weight.is_finite() && (0.0..=1.0).contains(&decay.access_weight),
            "decay",
            "access_weight must be within [0, 1]",
        );
        check(decay.batch_size > 0, "decay", "batch_size must be at least 1");

        check(self.retention.max_age_days > 0, "retention", "max_age_days must be at least 1");
        check(self.retention.batch_size > 0, "retention", "batch_size must be at least 1");

        check(self.frames.digest_top_k > 0, "frames", "digest_top_k must be at least 1");

        let cp = &self.checkpoint;
        if let Err(err) = cp.budget().validate() {
            check(false, "checkpoint", &err.to_string());
        }
        check(cp.excerpt_chars >= 16, "checkpoint", "excerpt_chars must be at least 16");
        check(cp.lock_attempts > 0, "checkpoint", "lock_attempts must be at least 1");
        check(cp.lock_timeout_ms > 0, "checkpoint", "lock_timeout_ms must be at least 1");

        if let Err(message) = self.logging.validate() {
            check(false, "logging", &message);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every violation into one `ConfigError`.
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
