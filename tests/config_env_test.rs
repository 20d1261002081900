//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use semantic_trajectory::config::{Config, LogFormat};
use semantic_trajectory::error::AppError;
use serial_test::serial;
use std::env;

const VARS: [&str; 13] = [
    "DATABASE_PATH",
    "DATABASE_MAX_CONNECTIONS",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "EMBEDDING_MODEL",
    "EMBEDDING_DIMENSIONS",
    "EMBEDDING_CACHE_SIZE",
    "EMBEDDING_TIMEOUT_MS",
    "ZONE_SAFE",
    "ZONE_TRANSITIONAL",
    "ZONE_RISK",
    "GUARD_BLOCK_IN_DANGER",
    "TRAJECTORY_WINDOW",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
    env::remove_var("GUARD_INJECT_BRIDGE_CONTEXT");
    env::remove_var("RECORDER_MAX_SESSIONS");
}

#[test]
#[serial]
fn test_config_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str(), Some("./data/semantic.db"));
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.embedding.model, "text-embedding-3-small");
    assert_eq!(config.embedding.dimensions, 1536);
    assert_eq!(config.embedding.cache_size, 1000);
    assert_eq!(config.embedding.timeout_ms, 30000);
    assert_eq!(config.guard.thresholds.safe, 0.4);
    assert_eq!(config.guard.thresholds.transitional, 0.6);
    assert_eq!(config.guard.thresholds.risk, 0.85);
    assert!(!config.guard.block_in_danger);
    assert!(config.guard.inject_bridge_context);
    assert_eq!(config.guard.trajectory_window, 5);
    assert_eq!(config.recorder.insight_limit, 200);
    assert_eq!(config.recorder.min_insight_len, 10);
    assert_eq!(config.recorder.trivial_tools, vec!["echo", "pwd", "whoami"]);
    assert_eq!(config.recorder.max_tracked_sessions, 1024);
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    clear_env();
    env::set_var("DATABASE_PATH", "/custom/path.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str(), Some("/custom/path.db"));
    assert_eq!(config.database.max_connections, 10);

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    clear_env();
    env::set_var("LOG_FORMAT", "JSON");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_embedding_overrides() {
    clear_env();
    env::set_var("EMBEDDING_MODEL", "nomic-embed-text");
    env::set_var("EMBEDDING_DIMENSIONS", "768");
    env::set_var("EMBEDDING_CACHE_SIZE", "0");
    env::set_var("EMBEDDING_TIMEOUT_MS", "2500");

    let config = Config::from_env().unwrap();
    assert_eq!(config.embedding.model, "nomic-embed-text");
    assert_eq!(config.embedding.dimensions, 768);
    assert_eq!(config.embedding.cache_size, 0);
    assert_eq!(config.embedding.timeout_ms, 2500);

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_thresholds_and_guard() {
    clear_env();
    env::set_var("ZONE_SAFE", "0.3");
    env::set_var("ZONE_TRANSITIONAL", "0.5");
    env::set_var("ZONE_RISK", "0.9");
    env::set_var("GUARD_BLOCK_IN_DANGER", "true");
    env::set_var("GUARD_INJECT_BRIDGE_CONTEXT", "false");
    env::set_var("TRAJECTORY_WINDOW", "8");
    env::set_var("RECORDER_MAX_SESSIONS", "16");

    let config = Config::from_env().unwrap();
    assert_eq!(config.guard.thresholds.safe, 0.3);
    assert_eq!(config.guard.thresholds.risk, 0.9);
    assert!(config.guard.block_in_danger);
    assert!(!config.guard.inject_bridge_context);
    assert_eq!(config.guard.trajectory_window, 8);
    assert_eq!(config.recorder.trajectory_window, 8);
    assert_eq!(config.recorder.max_tracked_sessions, 16);

    clear_env();
}

#[test]
#[serial]
fn test_config_rejects_unordered_thresholds() {
    clear_env();
    env::set_var("ZONE_SAFE", "0.7");
    env::set_var("ZONE_TRANSITIONAL", "0.6");

    let err = Config::from_env().unwrap_err();
    assert!(matches!(err, AppError::Config { .. }));

    clear_env();
}

#[test]
#[serial]
fn test_config_invalid_numbers_fall_back_to_defaults() {
    clear_env();
    env::set_var("DATABASE_MAX_CONNECTIONS", "many");
    env::set_var("EMBEDDING_DIMENSIONS", "-3");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.embedding.dimensions, 1536);

    clear_env();
}
