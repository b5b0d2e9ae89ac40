//! Integration tests for layered configuration

use crate::integration::test_utils::with_isolated_env;
use stackmemory::config::{global_config_path, project_config_path, ConfigLoader, StackConfig};
use stackmemory::error::ApiError;
use stackmemory::MemoryEngine;
use tempfile::TempDir;

fn write_project_config(project: &std::path::Path, body: &str) {
    let path = project_config_path(project);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[test]
fn test_defaults_when_no_files_exist() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_isolated_env(&temp_dir, &[], || {
        ConfigLoader::load(temp_dir.path()).unwrap()
    });
    assert_eq!(config, StackConfig::default());
}

#[test]
fn test_project_file_overrides_global_key_by_key() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();

    let config = with_isolated_env(&temp_dir, &[], || {
        let global = global_config_path().unwrap();
        std::fs::create_dir_all(global.parent().unwrap()).unwrap();
        std::fs::write(
            &global,
            r#"
[decay]
half_life_hours = 48.0
access_weight = 0.1

[compaction]
cooldown_secs = 120
"#,
        )
        .unwrap();
        write_project_config(
            &project,
            r#"
[decay]
half_life_hours = 12.0
"#,
        );
        ConfigLoader::load(&project).unwrap()
    });

    assert_eq!(config.decay.half_life_hours, 12.0);
    assert_eq!(config.decay.access_weight, 0.1);
    assert_eq!(config.compaction.cooldown_secs, 120);
    assert_eq!(config.retention.max_age_days, 90);
}

#[test]
fn test_environment_wins_over_files() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    write_project_config(&project, "[decay]\nhalf_life_hours = 12.0\n");

    let config = with_isolated_env(
        &temp_dir,
        &[
            ("STACKMEMORY__DECAY__HALF_LIFE_HOURS", "6"),
            ("STACKMEMORY__COMPACTION__COOLDOWN_SECS", "5"),
        ],
        || ConfigLoader::load(&project).unwrap(),
    );
    assert_eq!(config.decay.half_life_hours, 6.0);
    assert_eq!(config.compaction.cooldown_secs, 5);
}

#[test]
fn test_invalid_values_are_config_errors() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("bad.toml");
    std::fs::write(
        &file,
        r#"
[decay]
half_life_hours = -1.0

[checkpoint]
max_bytes = 10
"#,
    )
    .unwrap();

    let err = with_isolated_env(&temp_dir, &[], || ConfigLoader::load_from_file(&file)).unwrap_err();
    match err {
        ApiError::ConfigError(message) => {
            assert!(message.contains("decay"));
            assert!(message.contains("checkpoint"));
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_oversized_half_life_from_env_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();

    let result = with_isolated_env(
        &temp_dir,
        &[("STACKMEMORY__DECAY__HALF_LIFE_HOURS", "1e300")],
        || ConfigLoader::load(&project),
    );
    assert!(matches!(result, Err(ApiError::ConfigError(_))));

    let mut config = StackConfig::default();
    config.decay.half_life_hours = 1e300;
    let engine = MemoryEngine::temporary(
        &project,
        config,
        std::sync::Arc::new(stackmemory::clock::ManualClock::new(0)),
    );
    assert!(matches!(engine, Err(ApiError::ConfigError(_))));
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ApiError::ConfigError(_))));
}

#[test]
fn test_engine_store_lands_in_configured_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let data_dir = temp_dir.path().join("memory");
    write_project_config(
        &project,
        &format!("[storage]\ndata_dir = {:?}\n", data_dir.to_string_lossy()),
    );

    with_isolated_env(&temp_dir, &[], || {
        let config = ConfigLoader::load(&project).unwrap();
        let engine = MemoryEngine::open(&project, config).unwrap();
        let store_path = engine.store_path().unwrap().to_path_buf();
        assert!(store_path.starts_with(&data_dir));
        assert!(store_path.exists());
    });
}
