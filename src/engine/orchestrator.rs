//! Runs a move-search engine with a time budget, bounded retries and a
//! fallback move.
//!
//! Every attempt gets a fresh ticket. The worker and the timeout timer each
//! report back over the control channel stamped with that ticket; anything
//! carrying a ticket other than the current one is stale and dropped. This is
//! how late answers after a timeout, cancel, reset or role change are
//! discarded without touching session state.

use super::{FallbackMoveGenerator, MoveSearchEngine};
use crate::error::EngineError;
use crate::rules::RulesEngine;
use crate::types::{Move, SessionStatus, Side};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Completion messages produced by engine workers and timers.
#[derive(Debug)]
pub enum EngineEvent {
    /// The engine returned.
    Finished {
        /// Attempt the result belongs to.
        ticket: u64,
        /// Engine answer.
        result: Result<Option<Move>, EngineError>,
    },
    /// The time budget for an attempt ran out.
    TimedOut {
        /// Attempt that timed out.
        ticket: u64,
    },
    /// Backoff after a failed attempt elapsed.
    RetryDue {
        /// Ticket issued for the retry wait.
        ticket: u64,
    },
}

/// What the control task should do after an [`EngineEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineDecision {
    /// Play this move for `side`.
    Deliver {
        /// Side the move is for.
        side: Side,
        /// Canonical move.
        mv: Move,
        /// True if the move came from the fallback generator.
        fallback: bool,
    },
    /// The attempt failed and another one is scheduled.
    Retrying {
        /// Side waiting for a move.
        side: Side,
        /// Number of the upcoming attempt, starting at 1.
        attempt: u32,
        /// Why the previous attempt failed.
        reason: String,
    },
    /// No move exists; the game is over.
    GameEnded {
        /// Final status.
        status: SessionStatus,
        /// True when the status is a forfeit rather than the rules engine's
        /// verdict.
        forfeit: bool,
    },
    /// Stale or unknown event, ignored.
    Discarded,
}

struct PendingRequest<B> {
    ticket: u64,
    side: Side,
    failures: u32,
    board: B,
    engine: Arc<dyn MoveSearchEngine<B>>,
    worker: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl<B> PendingRequest<B> {
    fn abort_tasks(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Drives one outstanding engine request at a time.
///
/// Events are delivered on `tx` as `E`, so the orchestrator can share the
/// controller's single inbound channel.
pub struct AiMoveOrchestrator<R: RulesEngine, E> {
    rules: Arc<R>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
    fallback: FallbackMoveGenerator,
    tx: mpsc::UnboundedSender<E>,
    next_ticket: u64,
    pending: Option<PendingRequest<R::Board>>,
}

impl<R, E> AiMoveOrchestrator<R, E>
where
    R: RulesEngine,
    E: From<EngineEvent> + Send + 'static,
{
    /// Creates an idle orchestrator.
    pub fn new(
        rules: Arc<R>,
        timeout: Duration,
        max_retries: u32,
        backoff: Duration,
        fallback: FallbackMoveGenerator,
        tx: mpsc::UnboundedSender<E>,
    ) -> Self {
        Self {
            rules,
            timeout,
            max_retries,
            backoff,
            fallback,
            tx,
            next_ticket: 0,
            pending: None,
        }
    }

    /// True while a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Side of the outstanding request, if any.
    pub fn pending_side(&self) -> Option<Side> {
        self.pending.as_ref().map(|p| p.side)
    }

    /// Starts computing a move for `side`. Any outstanding request is
    /// cancelled first. Returns the ticket of the first attempt.
    #[instrument(skip(self, board, engine), fields(engine = engine.name()))]
    pub fn request_move(
        &mut self,
        board: R::Board,
        side: Side,
        engine: Arc<dyn MoveSearchEngine<R::Board>>,
    ) -> u64 {
        self.cancel();
        let mut pending = PendingRequest {
            ticket: 0,
            side,
            failures: 0,
            board,
            engine,
            worker: None,
            timer: None,
        };
        self.start_attempt(&mut pending);
        let ticket = pending.ticket;
        self.pending = Some(pending);
        ticket
    }

    /// Cancels the outstanding request. Results still in flight are discarded
    /// when they arrive. Returns true if something was cancelled.
    #[instrument(skip(self))]
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(mut pending) => {
                pending.abort_tasks();
                info!(side = %pending.side, ticket = pending.ticket, "Engine request cancelled");
                true
            }
            None => false,
        }
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn start_attempt(&mut self, pending: &mut PendingRequest<R::Board>) {
        let ticket = self.issue_ticket();
        pending.ticket = ticket;
        debug!(ticket, side = %pending.side, attempt = pending.failures + 1, "Dispatching engine");

        let engine = Arc::clone(&pending.engine);
        let board = pending.board.clone();
        let side = pending.side;
        let tx = self.tx.clone();
        pending.worker = Some(tokio::spawn(async move {
            let search = tokio::task::spawn_blocking(move || engine.best_move(&board, side));
            let result = match search.await {
                Ok(result) => result,
                Err(err) => Err(EngineError::new(format!("engine task failed: {err}"))),
            };
            if tx.send(EngineEvent::Finished { ticket, result }.into()).is_err() {
                debug!(ticket, "Control channel closed, dropping engine result");
            }
        }));

        let tx = self.tx.clone();
        let timeout = self.timeout;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if tx.send(EngineEvent::TimedOut { ticket }.into()).is_err() {
                debug!(ticket, "Control channel closed, dropping timeout");
            }
        }));
    }

    /// Handles a worker or timer event and decides what happens next.
    #[instrument(skip(self, event))]
    pub fn on_event(&mut self, event: EngineEvent) -> EngineDecision {
        let Some(mut pending) = self.pending.take() else {
            debug!(?event, "Engine event with no outstanding request");
            return EngineDecision::Discarded;
        };

        let ticket = match &event {
            EngineEvent::Finished { ticket, .. }
            | EngineEvent::TimedOut { ticket }
            | EngineEvent::RetryDue { ticket } => *ticket,
        };
        if ticket != pending.ticket {
            debug!(ticket, current = pending.ticket, "Discarding stale engine event");
            self.pending = Some(pending);
            return EngineDecision::Discarded;
        }

        match event {
            EngineEvent::Finished { result, .. } => {
                pending.abort_tasks();
                match result {
                    Ok(Some(mv)) => {
                        info!(side = %pending.side, %mv, "Engine delivered move");
                        EngineDecision::Deliver {
                            side: pending.side,
                            mv,
                            fallback: false,
                        }
                    }
                    Ok(None) => self.fail(pending, "engine returned no move".to_string()),
                    Err(err) => self.fail(pending, err.message),
                }
            }
            EngineEvent::TimedOut { .. } => {
                pending.abort_tasks();
                let reason = format!("engine timed out after {}ms", self.timeout.as_millis());
                self.fail(pending, reason)
            }
            EngineEvent::RetryDue { .. } => {
                pending.timer = None;
                let side = pending.side;
                self.start_attempt(&mut pending);
                debug!(%side, "Retry dispatched");
                self.pending = Some(pending);
                EngineDecision::Discarded
            }
        }
    }

    fn fail(&mut self, mut pending: PendingRequest<R::Board>, reason: String) -> EngineDecision {
        pending.failures += 1;
        warn!(side = %pending.side, failures = pending.failures, %reason, "Engine attempt failed");

        if pending.failures <= self.max_retries {
            let ticket = self.issue_ticket();
            pending.ticket = ticket;
            let tx = self.tx.clone();
            let backoff = self.backoff;
            pending.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                if tx.send(EngineEvent::RetryDue { ticket }.into()).is_err() {
                    debug!(ticket, "Control channel closed, dropping retry");
                }
            }));
            let decision = EngineDecision::Retrying {
                side: pending.side,
                attempt: pending.failures + 1,
                reason,
            };
            self.pending = Some(pending);
            return decision;
        }

        warn!(side = %pending.side, "Engine retries exhausted");
        self.fallback_move(&pending.board, pending.side)
    }

    /// Resolves `side`'s move with the fallback generator, ending the game
    /// when no legal move exists.
    #[instrument(skip(self, board))]
    pub fn fallback_move(&mut self, board: &R::Board, side: Side) -> EngineDecision {
        if let Some(mv) = self.fallback.pick(self.rules.as_ref(), board, side) {
            warn!(%mv, "Playing fallback move");
            return EngineDecision::Deliver {
                side,
                mv,
                fallback: true,
            };
        }

        let verdict = self.rules.check_game_state(board, side);
        if verdict.is_terminal() {
            info!(status = %verdict, "No legal move, rules engine confirms game over");
            EngineDecision::GameEnded {
                status: verdict,
                forfeit: false,
            }
        } else {
            warn!(status = %verdict, "No legal move on a live board, forfeiting");
            EngineDecision::GameEnded {
                status: SessionStatus::win_for(side.opponent()),
                forfeit: true,
            }
        }
    }
}

impl<R: RulesEngine, E> Drop for AiMoveOrchestrator<R, E> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.abort_tasks();
        }
    }
}

impl<R: RulesEngine, E> std::fmt::Debug for AiMoveOrchestrator<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiMoveOrchestrator")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("pending_ticket", &self.pending.as_ref().map(|p| p.ticket))
            .finish()
    }
}
