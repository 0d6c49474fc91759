//! Duel Session - turn-based two-player board game session controller
//!
//! This library sits between a passive rules engine and three kinds of
//! opponent: a local human, a local move-search engine, or a remote human on
//! the other end of a network link.
//!
//! # Architecture
//!
//! - **Pipeline**: validates moves against a [`RulesEngine`] and drives the
//!   [`TurnStateMachine`]
//! - **Engine**: runs a [`MoveSearchEngine`] off the control task with a time
//!   budget, retries and a fallback move
//! - **Relay**: translates frames for networked play and recovers sessions
//!   whose start message was lost
//! - **Controller**: the single control task owning all session state
//! - **Room**: a two-seat relay server that assigns sides
//!
//! # Example
//!
//! ```no_run
//! use duel_session::{
//!     BoardSize, PlayerRole, Roles, SessionConfig, SessionController, SimpleEngine,
//!     SkirmishBoard, SkirmishRules, Side,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let rules = Arc::new(SkirmishRules);
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let (mut controller, rx) = SessionController::new(
//!     Arc::clone(&rules),
//!     SkirmishBoard::standard(BoardSize::XIANGQI),
//!     SessionConfig::default(),
//!     Roles::new(PlayerRole::LocalHuman, PlayerRole::LocalEngine),
//!     events_tx,
//! );
//! controller.set_engine(Side::Second, Arc::new(SimpleEngine::new("greedy", rules)));
//! let handle = controller.handle();
//! tokio::spawn(controller.run(rx));
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod controller;
mod engine;
mod error;
mod frame;
mod history;
mod pipeline;
mod relay;
mod room;
mod rules;
mod transport;
mod turn;
mod types;

// Crate-level exports - Core types
pub use types::{BoardSize, Move, PlayerRole, Position, Roles, SessionStatus, Side};

// Crate-level exports - Errors
pub use error::{ConfigError, EngineError, SessionError, SessionErrorKind};

// Crate-level exports - Configuration
pub use config::SessionConfig;

// Crate-level exports - Coordinate frames
pub use frame::{is_flipped, move_to_canonical, move_to_local, to_canonical, to_local};

// Crate-level exports - Rules
pub use rules::{Rank, RulesEngine, SkirmishBoard, SkirmishPiece, SkirmishRules};

// Crate-level exports - Turn state and pipeline
pub use history::{BoardSnapshot, SessionHistory};
pub use pipeline::{MoveExecutionPipeline, MoveOutcome, UnsafeMovePolicy};
pub use turn::TurnStateMachine;

// Crate-level exports - Engines
pub use engine::{
    AiMoveOrchestrator, EngineDecision, EngineEvent, FallbackMoveGenerator, MoveSearchEngine,
    SimpleEngine, legal_moves,
};

// Crate-level exports - Network relay
pub use relay::{
    ChannelBus, ClientMessage, Inference, MessageBus, NetworkMoveRelay, NetworkSessionState,
    RecoveryTimer, RelayNotice, RelayPolicy, ServerMessage, SessionRecoveryProtocol, SyncReason,
    SyncState,
};

// Crate-level exports - Controller
pub use controller::{ControlEvent, SessionController, SessionEvent, SessionHandle, SessionView};

// Crate-level exports - Transport and room
pub use room::{PlayerId, RoomServer, RoomState};
pub use transport::{LineTransport, spawn_line_io};
