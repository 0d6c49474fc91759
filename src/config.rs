//! Session configuration.

use crate::error::ConfigError;
use crate::pipeline::UnsafeMovePolicy;
use crate::relay::RelayPolicy;
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Tunables for one session. Every field has a default, so an empty TOML
/// file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct SessionConfig {
    /// Time budget for one engine attempt, in milliseconds.
    engine_timeout_ms: u64,

    /// Retries after the first failed engine attempt.
    max_engine_retries: u32,

    /// Delay before retrying a failed engine attempt, in milliseconds.
    retry_backoff_ms: u64,

    /// Undo history capacity.
    history_capacity: usize,

    /// What to do with locally made moves that leave the mover in check.
    unsafe_moves: UnsafeMovePolicy,

    /// Accept opponent moves the rules engine flags as unsafe.
    accept_unsafe_remote_moves: bool,

    /// Draw the board from SECOND's side when playing SECOND.
    flip_for_second: bool,

    /// How long to wait for the session-start message after joining, in
    /// milliseconds.
    session_start_window_ms: u64,

    /// How long to wait for a sync reply, in milliseconds.
    sync_reply_timeout_ms: u64,

    /// Seed for the fallback move generator; random when unset.
    #[setters(strip_option)]
    fallback_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine_timeout_ms: 30_000,
            max_engine_retries: 1,
            retry_backoff_ms: 1_000,
            history_capacity: 200,
            unsafe_moves: UnsafeMovePolicy::Reject,
            accept_unsafe_remote_moves: false,
            flip_for_second: true,
            session_start_window_ms: 5_000,
            sync_reply_timeout_ms: 5_000,
            fallback_seed: None,
        }
    }
}

impl SessionConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(
            engine_timeout_ms = config.engine_timeout_ms,
            max_engine_retries = config.max_engine_retries,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Engine time budget.
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    /// Backoff between engine attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Relay settings derived from this configuration.
    pub fn relay_policy(&self) -> RelayPolicy {
        RelayPolicy {
            accept_unsafe_remote_moves: self.accept_unsafe_remote_moves,
            flip_for_second: self.flip_for_second,
            session_start_window: Duration::from_millis(self.session_start_window_ms),
            sync_reply_timeout: Duration::from_millis(self.sync_reply_timeout_ms),
        }
    }
}
