//! Error types for the session controller.

use derive_more::{Display, Error};
use tracing::instrument;

/// Category of a session error.
///
/// Mirrors how the controller reacts: the first three are handled inside the
/// session and surfaced as notifications, the last two force a terminal or
/// torn-down state.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionErrorKind {
    /// Illegal or out-of-turn input, rejected and never retried.
    #[display("illegal input: {}", _0)]
    IllegalInput(String),
    /// Engine timeout, failure or empty answer.
    #[display("engine failure: {}", _0)]
    EngineTransient(String),
    /// The peers disagree about the board, the turn or the side assignment.
    #[display("protocol desync: {}", _0)]
    ProtocolDesync(String),
    /// A confirmed side assignment was contradicted by the peer.
    #[display("fatal protocol violation: {}", _0)]
    FatalProtocolViolation(String),
    /// No legal move exists but the rules engine reports a live game.
    #[display("engine defect: {}", _0)]
    EngineDefect(String),
    /// Transport failure (socket closed, channel dropped).
    #[display("transport: {}", _0)]
    Transport(String),
    /// Wire message could not be encoded or decoded.
    #[display("codec: {}", _0)]
    Codec(String),
}

/// Session error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Session error: {} at {}:{}", kind, file, line)]
pub struct SessionError {
    /// What went wrong.
    pub kind: SessionErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SessionError {
    /// Creates a new session error with caller location tracking.
    #[track_caller]
    #[instrument(skip(kind))]
    pub fn new(kind: SessionErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Returns true if this error must end or tear down the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SessionErrorKind::FatalProtocolViolation(_) | SessionErrorKind::EngineDefect(_)
        )
    }
}

impl From<serde_json::Error> for SessionError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(SessionErrorKind::Codec(err.to_string()))
    }
}

impl From<std::io::Error> for SessionError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::new(SessionErrorKind::Transport(err.to_string()))
    }
}

/// Error raised by a move-search engine.
#[derive(Debug, Clone, Display, Error)]
#[display("Engine error: {} at {}:{}", message, file, line)]
pub struct EngineError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl EngineError {
    /// Creates a new engine error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
