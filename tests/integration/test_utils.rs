//! Shared test utilities for integration tests
//!
//! Engines over a manual clock, plus serialized access to the environment
//! variables the config loader reads.

use stackmemory::clock::ManualClock;
use stackmemory::config::StackConfig;
use stackmemory::MemoryEngine;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 2023-11-14T22:13:20Z
pub const START_MS: u64 = 1_700_000_000_000;

pub const HOUR_MS: u64 = 3_600_000;
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ENV_KEYS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "XDG_DATA_HOME",
    "STACKMEMORY__DECAY__HALF_LIFE_HOURS",
    "STACKMEMORY__COMPACTION__COOLDOWN_SECS",
];

/// Environment variable state to restore after test
struct EnvState(Vec<(&'static str, Option<String>)>);

impl EnvState {
    fn capture() -> Self {
        Self(ENV_KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect())
    }

    fn restore(self) {
        for (key, value) in self.0 {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// Run `f` with HOME and XDG directories pointed into `test_dir`.
///
/// Variables listed in `vars` are set for the duration of the call; the
/// original environment is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let config_home = test_dir.path().join("config");
    let data_home = test_dir.path().join("data");
    let home = test_dir.path().join("home");
    for dir in [&config_home, &data_home, &home] {
        std::fs::create_dir_all(dir).unwrap();
    }

    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    std::env::set_var("XDG_DATA_HOME", &data_home);
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let result = f();

    env_state.restore();
    result
}

/// In-memory engine with the default configuration over a manual clock.
pub fn temp_engine() -> (MemoryEngine, ManualClock) {
    temp_engine_with(StackConfig::default())
}

pub fn temp_engine_with(config: StackConfig) -> (MemoryEngine, ManualClock) {
    let clock = ManualClock::new(START_MS);
    let engine =
        MemoryEngine::temporary(Path::new("/project"), config, Arc::new(clock.clone())).unwrap();
    (engine, clock)
}

/// On-disk engine whose data directory lives in `dir`.
pub fn disk_engine(dir: &TempDir, clock: &ManualClock) -> MemoryEngine {
    let mut config = StackConfig::default();
    config.storage.data_dir = Some(dir.path().join("data"));
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    MemoryEngine::open_with_clock(&project, config, Arc::new(clock.clone())).unwrap()
}
