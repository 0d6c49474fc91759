//! Tests for loading session configuration from TOML files.

use duel_session::{SessionConfig, UnsafeMovePolicy};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes()).expect("Failed to write config");
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
engine_timeout_ms = 2500
unsafe_moves = "warn"
fallback_seed = 99
"#,
    );
    let config = SessionConfig::from_file(file.path()).expect("Load failed");

    assert_eq!(config.engine_timeout(), Duration::from_millis(2500));
    assert_eq!(*config.unsafe_moves(), UnsafeMovePolicy::Warn);
    assert_eq!(*config.fallback_seed(), Some(99));
    assert_eq!(*config.max_engine_retries(), 1);
    assert_eq!(*config.history_capacity(), 200);
    assert!(*config.flip_for_second());
}

#[test]
fn test_empty_file_is_default() {
    let file = write_config("");
    let config = SessionConfig::from_file(file.path()).expect("Load failed");
    assert_eq!(config, SessionConfig::default());
}

#[test]
fn test_relay_policy_follows_file() {
    let file = write_config(
        r#"
accept_unsafe_remote_moves = true
flip_for_second = false
session_start_window_ms = 750
sync_reply_timeout_ms = 1500
"#,
    );
    let policy = SessionConfig::from_file(file.path())
        .expect("Load failed")
        .relay_policy();

    assert!(policy.accept_unsafe_remote_moves);
    assert!(!policy.flip_for_second);
    assert_eq!(policy.session_start_window, Duration::from_millis(750));
    assert_eq!(policy.sync_reply_timeout, Duration::from_millis(1500));
}

#[test]
fn test_bad_value_is_reported() {
    let file = write_config("unsafe_moves = \"sometimes\"\n");
    let err = SessionConfig::from_file(file.path()).expect_err("Invalid policy accepted");
    assert!(err.message.contains("Failed to parse config"));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let err = SessionConfig::from_file(dir.path().join("absent.toml"))
        .expect_err("Missing file accepted");
    assert!(err.message.contains("Failed to read config file"));
}
