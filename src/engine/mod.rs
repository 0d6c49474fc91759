//! Move-search engines and the orchestrator that runs them off the control
//! task.

mod fallback;
mod orchestrator;
mod simple;

pub use fallback::{FallbackMoveGenerator, legal_moves};
pub use orchestrator::{AiMoveOrchestrator, EngineDecision, EngineEvent};
pub use simple::SimpleEngine;

use crate::error::EngineError;
use crate::types::{Move, Side};

/// A blocking move-search engine.
///
/// Engines are untrusted: they may take arbitrarily long, fail, or return no
/// move. The orchestrator runs them on the blocking pool and never waits on
/// them from the control task.
///
/// Cancelling or timing out an attempt only discards its answer. The call to
/// [`best_move`](Self::best_move) keeps its blocking-pool thread until it
/// returns, so an engine that may search without bound must cap its own
/// search time; each abandoned attempt otherwise holds a thread.
pub trait MoveSearchEngine<B>: Send + Sync {
    /// Display name of the engine.
    fn name(&self) -> &str;

    /// Computes a move for `side`, canonical frame. `Ok(None)` means the engine
    /// found nothing to play.
    fn best_move(&self, board: &B, side: Side) -> Result<Option<Move>, EngineError>;
}
