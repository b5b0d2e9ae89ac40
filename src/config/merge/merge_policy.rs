//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources win key by key; a file that sets one key in a section leaves
//! the section's other keys at their defaults.

use crate::config::StackConfig;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    let d = StackConfig::default();
    Config::builder()
        .set_default("decay.half_life_hours", d.decay.half_life_hours)?
        .set_default("decay.access_weight", d.decay.access_weight)?
        .set_default("decay.batch_size", d.decay.batch_size as u64)?
        .set_default("retention.max_age_days", d.retention.max_age_days)?
        .set_default("retention.batch_size", d.retention.batch_size as u64)?
        .set_default("retention.backup_before_prune", d.retention.backup_before_prune)?
        .set_default("frames.stale_after_hours", d.frames.stale_after_hours)?
        .set_default("frames.digest_top_k", d.frames.digest_top_k as u64)?
        .set_default("checkpoint.max_bytes", d.checkpoint.max_bytes as u64)?
        .set_default("checkpoint.max_tokens", d.checkpoint.max_tokens as u64)?
        .set_default("checkpoint.max_frames", d.checkpoint.max_frames as u64)?
        .set_default("checkpoint.max_items", d.checkpoint.max_items as u64)?
        .set_default("checkpoint.recent_window_hours", d.checkpoint.recent_window_hours)?
        .set_default("checkpoint.excerpt_chars", d.checkpoint.excerpt_chars as u64)?
        .set_default("checkpoint.lock_timeout_ms", d.checkpoint.lock_timeout_ms)?
        .set_default("checkpoint.lock_attempts", d.checkpoint.lock_attempts as u64)?
        .set_default("compaction.cooldown_secs", d.compaction.cooldown_secs)?
        .set_default("scheduler.decay_interval_secs", d.scheduler.decay_interval_secs)?
        .set_default("scheduler.sweep_interval_secs", d.scheduler.sweep_interval_secs)?
        .set_default("scheduler.checkpoint_interval_secs", d.scheduler.checkpoint_interval_secs)?
        .set_default("scheduler.job_deadline_secs", d.scheduler.job_deadline_secs)?
        .set_default("logging.level", d.logging.level)?
        .set_default("logging.format", d.logging.format)?
        .set_default("logging.output", d.logging.output)?
        .set_default("logging.color", d.logging.color)
}
